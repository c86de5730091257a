//! In-process node used by unit tests that need more than a single mocked call.

use crate::{
    error::RpcError,
    rpc::{
        BlockNumberOrTag,
        Receipt,
        RpcNode,
        TransactionRequest,
    },
};

use alloy::{
    consensus::{
        Transaction,
        TxEnvelope,
    },
    eips::eip2718::Decodable2718,
    primitives::{
        Address,
        B256,
        Bytes,
    },
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{
    HashMap,
    HashSet,
};

pub const GAS_USED: u64 = 50_000;

/// A legacy receipt as a node would return it over JSON-RPC.
pub fn mined_receipt(
    tx_hash: B256,
    success: bool,
    contract_address: Option<Address>,
    gas_used: u64,
    block_number: u64,
) -> Receipt {
    serde_json::from_value(json!({
        "type": "0x0",
        "status": if success { "0x1" } else { "0x0" },
        "cumulativeGasUsed": format!("0x{gas_used:x}"),
        "logs": [],
        "logsBloom": format!("0x{}", "0".repeat(512)),
        "transactionHash": tx_hash,
        "transactionIndex": "0x0",
        "blockHash": B256::with_last_byte(1),
        "blockNumber": format!("0x{block_number:x}"),
        "gasUsed": format!("0x{gas_used:x}"),
        "effectiveGasPrice": "0x1",
        "from": Address::ZERO,
        "to": null,
        "contractAddress": contract_address,
    }))
    .expect("receipt JSON matches the RPC schema")
}

#[derive(Debug, Default)]
struct State {
    nonce: u64,
    created: u64,
    sent: Vec<TxEnvelope>,
    receipts: HashMap<B256, Receipt>,
    call_responses: HashMap<Address, Bytes>,
    failing_estimates: HashSet<u64>,
    revert_next: bool,
}

/// Accepts every transaction, mines it on the spot and hands out contract addresses
/// `0xc0..01`, `0xc0..02` and so on.
#[derive(Debug, Default)]
pub struct FakeNode {
    state: Mutex<State>,
}

impl FakeNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the `n`-th contract created on this node, starting at 1.
    pub fn contract_address(n: u64) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = 0xc0;
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Address::from(bytes)
    }

    /// Makes the simulation of the `n`-th transaction (0-based) revert.
    pub fn fail_estimate(&self, n: u64) {
        self.state.lock().failing_estimates.insert(n);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failing_estimates.clear();
    }

    /// Mines the next transaction with a failure status.
    pub fn revert_next(&self) {
        self.state.lock().revert_next = true;
    }

    pub fn set_call_response(&self, to: Address, data: Bytes) {
        self.state.lock().call_responses.insert(to, data);
    }

    pub fn sent(&self) -> Vec<TxEnvelope> {
        self.state.lock().sent.clone()
    }

    pub fn sent_nonces(&self) -> Vec<u64> {
        self.state.lock().sent.iter().map(Transaction::nonce).collect()
    }
}

#[async_trait]
impl RpcNode for FakeNode {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(1337)
    }

    async fn estimate_gas(&self, _request: &TransactionRequest) -> Result<u64, RpcError> {
        let state = self.state.lock();
        if state.failing_estimates.contains(&(state.sent.len() as u64)) {
            return Err(RpcError::JsonRpc {
                code: 3,
                message: "execution reverted".to_string(),
            });
        }
        Ok(GAS_USED * 2)
    }

    async fn transaction_count(
        &self,
        _address: Address,
        tag: BlockNumberOrTag,
    ) -> Result<u64, RpcError> {
        assert_eq!(tag, BlockNumberOrTag::Pending);
        Ok(self.state.lock().nonce)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, RpcError> {
        let tx = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|err| RpcError::InvalidResponse(err.to_string()))?;
        let hash = *tx.tx_hash();

        let mut state = self.state.lock();
        let reverted = std::mem::take(&mut state.revert_next);
        let contract_address = if tx.kind().is_create() && !reverted {
            state.created += 1;
            Some(Self::contract_address(state.created))
        } else {
            None
        };

        state.nonce += 1;
        let receipt = mined_receipt(hash, !reverted, contract_address, GAS_USED, state.nonce);
        state.receipts.insert(hash, receipt);
        state.sent.push(tx);
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        Ok(self.state.lock().receipts.get(&hash).cloned())
    }

    async fn call(
        &self,
        request: &TransactionRequest,
        _tag: BlockNumberOrTag,
    ) -> Result<Bytes, RpcError> {
        let state = self.state.lock();
        Ok(request
            .to
            .and_then(|kind| kind.to().copied())
            .and_then(|to| state.call_responses.get(&to).cloned())
            .unwrap_or_else(|| Bytes::from(vec![0u8; 32])))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, RpcError> {
        let state = self.state.lock();
        let deployed = (1..=state.created).any(|n| Self::contract_address(n) == address);
        Ok(if deployed {
            Bytes::from_static(&[0x60, 0x80])
        } else {
            Bytes::new()
        })
    }
}
