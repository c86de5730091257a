//! Signs, broadcasts and confirms transactions.
//!
//! Every submission goes through the same pipeline: simulate with `eth_estimateGas`, fetch the
//! pending nonce, sign a legacy EIP-155 transaction locally, broadcast it and poll for the
//! receipt. Submissions from the same signer are serialized so that no two of them ever read
//! the same pending nonce.

use crate::{
    error::{
        RpcError,
        SubmitError,
    },
    rpc::{
        BlockNumberOrTag,
        Receipt,
        RpcNode,
        transaction_request,
    },
};

use alloy::{
    consensus::{
        SignableTransaction,
        TxEnvelope,
        TxLegacy,
    },
    eips::eip2718::Encodable2718,
    primitives::{
        Address,
        B256,
        Bytes,
        Signature,
        TxKind,
        U256,
    },
    signers::{
        SignerSync,
        local::PrivateKeySigner,
    },
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};
use tokio::sync::{
    Mutex as AsyncMutex,
    OnceCell,
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

/// Delay between two receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What to send. Sender, nonce, gas limit and chain id are filled in by the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionCall {
    /// `None` creates a contract from `data`
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub gas_price_wei: u128,
}

impl TransactionCall {
    pub fn call(to: Address, data: Bytes, gas_price_wei: u128) -> Self {
        Self {
            to: Some(to),
            data,
            value: U256::ZERO,
            gas_price_wei,
        }
    }

    pub fn create(init_code: Bytes, gas_price_wei: u128) -> Self {
        Self {
            to: None,
            data: init_code,
            value: U256::ZERO,
            gas_price_wei,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// A signed transaction, ready to broadcast.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub gas_price: u128,
    pub gas: u64,
    pub nonce: u64,
    pub signature: Signature,
    pub hash: B256,
    pub raw: Bytes,
}

/// Gas spent by confirmed transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasReport {
    pub transactions: u64,
    pub gas_used: u64,
    pub cost_wei: U256,
}

impl GasReport {
    fn record(&mut self, gas_used: u64, gas_price_wei: u128) {
        self.transactions += 1;
        self.gas_used += gas_used;
        self.cost_wei += U256::from(gas_used) * U256::from(gas_price_wei);
    }

    /// What was spent since `earlier` was taken.
    pub fn since(&self, earlier: &GasReport) -> GasReport {
        GasReport {
            transactions: self.transactions - earlier.transactions,
            gas_used: self.gas_used - earlier.gas_used,
            cost_wei: self.cost_wei - earlier.cost_wei,
        }
    }
}

/// Submits transactions to a node and waits for them to be mined.
pub struct TransactionSubmitter {
    node: Arc<dyn RpcNode>,
    poll_interval: Duration,
    chain_id: OnceCell<u64>,
    signer_locks: Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>,
    gas_report: Mutex<GasReport>,
}

impl std::fmt::Debug for TransactionSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSubmitter")
            .field("poll_interval", &self.poll_interval)
            .field("chain_id", &self.chain_id.get())
            .finish_non_exhaustive()
    }
}

impl TransactionSubmitter {
    pub fn new(node: Arc<dyn RpcNode>) -> Self {
        Self {
            node,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chain_id: OnceCell::new(),
            signer_locks: Mutex::new(HashMap::new()),
            gas_report: Mutex::new(GasReport::default()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Uses `chain_id` instead of asking the node.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = OnceCell::new_with(Some(chain_id));
        self
    }

    pub fn node(&self) -> &Arc<dyn RpcNode> {
        &self.node
    }

    pub fn gas_report(&self) -> GasReport {
        *self.gas_report.lock()
    }

    /// Chain id used for replay protection, fetched once.
    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        self.chain_id
            .get_or_try_init(|| self.node.chain_id())
            .await
            .copied()
    }

    /// Simulates `call` from `from` and returns the gas it needs.
    ///
    /// A JSON-RPC error from the node means the call reverts and maps to
    /// [`SubmitError::SimulationFailed`].
    pub async fn estimate(&self, call: &TransactionCall, from: Address) -> Result<u64, SubmitError> {
        let request = transaction_request(from, call);
        match self.node.estimate_gas(&request).await {
            Ok(gas) => Ok(gas),
            Err(RpcError::JsonRpc { message, .. }) => {
                Err(SubmitError::SimulationFailed { reason: message })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Runs the full pipeline for `call` and returns the receipt of the mined transaction.
    ///
    /// Nothing is broadcast if the simulation fails. A mined transaction with a failure
    /// status fails with [`SubmitError::RevertedExecution`].
    pub async fn submit(
        &self,
        call: TransactionCall,
        signer: &PrivateKeySigner,
    ) -> Result<Receipt, SubmitError> {
        let from = signer.address();
        let lock = self.signer_lock(from);
        let _guard = lock.lock().await;

        let gas = self.estimate(&call, from).await?;
        let chain_id = self.chain_id().await?;
        let nonce = self
            .node
            .transaction_count(from, BlockNumberOrTag::Pending)
            .await?;

        let pending = sign_transaction(&call, gas, nonce, chain_id, signer)?;
        info!(
            target: "submitter",
            %from,
            nonce,
            gas,
            gas_price = call.gas_price_wei,
            tx_hash = %pending.hash,
            "Broadcasting transaction"
        );

        let tx_hash = self.node.send_raw_transaction(pending.raw.clone()).await?;
        if tx_hash != pending.hash {
            warn!(
                target: "submitter",
                local = %pending.hash,
                node = %tx_hash,
                "Node reported a different transaction hash"
            );
        }

        let receipt = self.wait_for_receipt(tx_hash).await;
        self.gas_report
            .lock()
            .record(receipt.gas_used, call.gas_price_wei);

        if !receipt.status() {
            error!(target: "submitter", %tx_hash, "Transaction reverted");
            return Err(SubmitError::RevertedExecution { tx_hash });
        }

        debug!(target: "submitter", %tx_hash, gas_used = %receipt.gas_used, "Transaction mined");
        Ok(receipt)
    }

    /// Polls until the node returns a receipt for `tx_hash`.
    ///
    /// Errors while polling count as "not yet mined".
    pub async fn wait_for_receipt(&self, tx_hash: B256) -> Receipt {
        loop {
            match self.node.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => debug!(target: "submitter", %tx_hash, "Waiting for receipt"),
                Err(err) => {
                    debug!(target: "submitter", %tx_hash, error = %err, "Receipt poll failed")
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn signer_lock(&self, signer: Address) -> Arc<AsyncMutex<()>> {
        self.signer_locks.lock().entry(signer).or_default().clone()
    }
}

/// Builds and signs a legacy EIP-155 transaction.
pub fn sign_transaction(
    call: &TransactionCall,
    gas: u64,
    nonce: u64,
    chain_id: u64,
    signer: &PrivateKeySigner,
) -> Result<PendingTransaction, SubmitError> {
    let tx = TxLegacy {
        chain_id: Some(chain_id),
        nonce,
        gas_price: call.gas_price_wei,
        gas_limit: gas,
        to: call.to.map_or(TxKind::Create, TxKind::Call),
        value: call.value,
        input: call.data.clone(),
    };

    let signature = signer.sign_hash_sync(&tx.signature_hash())?;
    let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
    let hash = *envelope.tx_hash();
    let raw = Bytes::from(envelope.encoded_2718());

    Ok(PendingTransaction {
        to: call.to,
        data: call.data.clone(),
        value: call.value,
        gas_price: call.gas_price_wei,
        gas,
        nonce,
        signature,
        hash,
        raw,
    })
}
