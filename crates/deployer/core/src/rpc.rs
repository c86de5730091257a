use crate::{
    error::RpcError,
    submitter::TransactionCall,
};

use alloy::{
    eips::BlockId,
    network::TransactionBuilder,
    primitives::{
        Address,
        B256,
        Bytes,
    },
    providers::{
        Provider,
        RootProvider,
    },
};
use async_trait::async_trait;
use tracing::trace;
use url::Url;

pub use alloy::{
    eips::BlockNumberOrTag,
    rpc::types::{
        TransactionReceipt as Receipt,
        TransactionRequest,
    },
};

/// A read-only call with no sender.
pub fn read_request(to: Address, data: Bytes) -> TransactionRequest {
    TransactionRequest::default().with_to(to).with_input(data)
}

/// The request simulating `call` sent from `from`.
pub fn transaction_request(from: Address, call: &TransactionCall) -> TransactionRequest {
    let request = TransactionRequest::default()
        .with_from(from)
        .with_input(call.data.clone())
        .with_value(call.value);
    match call.to {
        Some(to) => request.with_to(to),
        None => request,
    }
}

/// Read and write access to an Ethereum node.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RpcNode: Send + Sync {
    async fn chain_id(&self) -> Result<u64, RpcError>;

    /// Gas a transaction would use. A JSON-RPC error means the simulation reverted.
    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, RpcError>;

    async fn transaction_count(
        &self,
        address: Address,
        tag: BlockNumberOrTag,
    ) -> Result<u64, RpcError>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, RpcError>;

    /// `None` while the transaction is not mined.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError>;

    async fn call(
        &self,
        request: &TransactionRequest,
        tag: BlockNumberOrTag,
    ) -> Result<Bytes, RpcError>;

    async fn code_at(&self, address: Address) -> Result<Bytes, RpcError>;
}

/// [`RpcNode`] over an HTTP JSON-RPC endpoint.
///
/// ```no_run
/// use deployer_core::rpc::{HttpRpcClient, RpcNode};
///
/// #[tokio::main]
/// async fn main() {
///     let node = HttpRpcClient::new("http://localhost:8545").unwrap();
///     let chain_id = node.chain_id().await.unwrap();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HttpRpcClient {
    provider: RootProvider,
}

impl HttpRpcClient {
    pub fn new(rpc_url: &str) -> Result<Self, RpcError> {
        let url = Url::parse(rpc_url)?;
        Ok(Self {
            provider: RootProvider::new_http(url),
        })
    }

    pub fn provider(&self) -> &RootProvider {
        &self.provider
    }
}

#[async_trait]
impl RpcNode for HttpRpcClient {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, RpcError> {
        trace!(target: "rpc", to = ?request.to, "eth_estimateGas");
        Ok(self.provider.estimate_gas(request.clone()).await?)
    }

    async fn transaction_count(
        &self,
        address: Address,
        tag: BlockNumberOrTag,
    ) -> Result<u64, RpcError> {
        Ok(self
            .provider
            .get_transaction_count(address)
            .block_id(BlockId::Number(tag))
            .await?)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, RpcError> {
        let pending = self.provider.send_raw_transaction(&raw).await?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        Ok(self.provider.get_transaction_receipt(hash).await?)
    }

    async fn call(
        &self,
        request: &TransactionRequest,
        tag: BlockNumberOrTag,
    ) -> Result<Bytes, RpcError> {
        Ok(self
            .provider
            .call(request.clone())
            .block(BlockId::Number(tag))
            .await?)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, RpcError> {
        Ok(self.provider.get_code_at(address).await?)
    }
}
