use alloy::{
    consensus::{
        Transaction,
        TxEnvelope,
        transaction::SignerRecoverable,
    },
    eips::{
        Typed2718,
        eip2718::Decodable2718,
    },
    primitives::{
        Address,
        B256,
        Bytes,
        U256,
    },
};
use axum::{
    Json,
    Router,
    extract::State,
    routing::post,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{
    Value,
    json,
};
use std::sync::{
    Arc,
    atomic::{
        AtomicBool,
        AtomicU64,
        Ordering,
    },
};
use tokio::net::TcpListener;
use tracing::{
    debug,
    error,
};

pub const CHAIN_ID: u64 = 1337;
pub const GAS_ESTIMATE: u64 = 100_000;
pub const GAS_USED: u64 = 50_000;

/// Bytecode reported for every contract the node created.
const DEPLOYED_CODE: [u8; 2] = [0x60, 0x80];

#[derive(Debug, Default)]
struct NodeState {
    overrides: DashMap<String, Value>,
    calls: DashMap<String, u64>,
    receipts: DashMap<B256, Value>,
    pending_polls: DashMap<B256, u64>,
    code: DashMap<Address, Bytes>,
    call_responses: DashMap<Address, Bytes>,
    sent: Mutex<Vec<TxEnvelope>>,
    nonces: DashMap<Address, u64>,
    block: AtomicU64,
    created: AtomicU64,
    receipt_delay: AtomicU64,
    revert_next: AtomicBool,
}

/// JSON-RPC node served over HTTP that mines every raw transaction it receives.
///
/// Contract creations get the addresses `0xc0..01`, `0xc0..02` and so on. Any method can be
/// overridden with a canned response through [`MockNode::add_response`].
#[derive(Debug, Clone)]
pub struct MockNode {
    state: Arc<NodeState>,
    port: u16,
}

impl MockNode {
    pub async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let node = Self {
            state: Arc::new(NodeState::default()),
            port,
        };
        node.start_http_server(listener);

        Ok(node)
    }

    pub fn http_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Address of the `n`-th contract created on this node, starting at 1.
    pub fn contract_address(n: u64) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = 0xc0;
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Address::from(bytes)
    }

    /// Answer every request for `method` with `response` instead of simulating it.
    pub fn add_response(&self, method: &str, response: Value) {
        self.state.overrides.insert(method.to_string(), response);
    }

    pub fn mock_rpc_error(&self, method: &str, error_code: i32, error_message: &str) {
        let response = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": error_code,
                "message": error_message
            }
        });
        self.add_response(method, response);
    }

    pub fn clear_response(&self, method: &str) {
        self.state.overrides.remove(method);
    }

    /// Mines the next transaction with a failure status.
    pub fn revert_next(&self) {
        self.state.revert_next.store(true, Ordering::Release);
    }

    /// Number of receipt polls answered with `null` before a receipt shows up.
    pub fn set_receipt_delay(&self, polls: u64) {
        self.state.receipt_delay.store(polls, Ordering::Release);
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        self.state.code.insert(address, code);
    }

    pub fn set_call_response(&self, to: Address, data: Bytes) {
        self.state.call_responses.insert(to, data);
    }

    pub fn call_count(&self, method: &str) -> u64 {
        self.state.calls.get(method).map(|count| *count).unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<TxEnvelope> {
        self.state.sent.lock().clone()
    }

    pub fn created(&self) -> u64 {
        self.state.created.load(Ordering::Acquire)
    }

    fn start_http_server(&self, listener: TcpListener) {
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let app = Router::new()
                .route("/", post(handle_http_request))
                .with_state(state);

            if let Err(e) = axum::serve(listener, app).await {
                error!(target: "mock_node", error = %e, "HTTP server error");
            }
        });
    }
}

async fn handle_http_request(
    State(state): State<Arc<NodeState>>,
    Json(request): Json<Value>,
) -> Json<Value> {
    Json(generate_response(&request, &state))
}

fn generate_response(request: &Value, state: &NodeState) -> Value {
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    let id = request.get("id").cloned().unwrap_or(json!(1));
    let params = request
        .get("params")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    *state.calls.entry(method.to_string()).or_insert(0) += 1;
    debug!(target: "mock_node", method, "Handling request");

    if let Some(response) = state.overrides.get(method) {
        let mut response = response.clone();
        if let Some(obj) = response.as_object_mut() {
            obj.insert("id".to_string(), id);
        }
        return response;
    }

    let result = match method {
        "eth_chainId" => Ok(json!(format!("0x{CHAIN_ID:x}"))),
        "eth_estimateGas" => Ok(json!(format!("0x{GAS_ESTIMATE:x}"))),
        "eth_getTransactionCount" => Ok(transaction_count(&params, state)),
        "eth_sendRawTransaction" => send_raw_transaction(&params, state),
        "eth_getTransactionReceipt" => Ok(transaction_receipt(&params, state)),
        "eth_call" => Ok(call(&params, state)),
        "eth_getCode" => Ok(code_at(&params, state)),
        _ => Err((-32601, format!("the method {method} does not exist"))),
    };

    match result {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": code, "message": message }
            })
        }
    }
}

fn param<T: serde::de::DeserializeOwned>(params: &[Value], index: usize) -> Option<T> {
    params
        .get(index)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

fn send_raw_transaction(params: &[Value], state: &NodeState) -> Result<Value, (i32, String)> {
    let raw: Bytes = param(params, 0).ok_or((-32602, "missing raw transaction".to_string()))?;
    let tx = TxEnvelope::decode_2718(&mut raw.as_ref()).map_err(|e| (-32602, e.to_string()))?;
    let hash = *tx.tx_hash();
    let from = tx.recover_signer().map_err(|e| (-32000, e.to_string()))?;

    let mut nonce = state.nonces.entry(from).or_insert(0);
    if tx.nonce() != *nonce {
        return Err((
            -32000,
            format!("nonce too low: next nonce {}, tx nonce {}", *nonce, tx.nonce()),
        ));
    }
    *nonce += 1;
    drop(nonce);

    let reverted = state.revert_next.swap(false, Ordering::AcqRel);
    let contract_address = if tx.kind().is_create() && !reverted {
        let n = state.created.fetch_add(1, Ordering::AcqRel) + 1;
        let address = MockNode::contract_address(n);
        state.code.insert(address, Bytes::from_static(&DEPLOYED_CODE));
        Some(address)
    } else {
        None
    };

    let block = state.block.fetch_add(1, Ordering::AcqRel) + 1;
    let receipt = json!({
        "type": format!("0x{:x}", tx.ty()),
        "status": if reverted { "0x0" } else { "0x1" },
        "cumulativeGasUsed": format!("0x{GAS_USED:x}"),
        "logs": [],
        "logsBloom": format!("0x{}", "0".repeat(512)),
        "transactionHash": hash,
        "transactionIndex": "0x0",
        "blockHash": B256::from(U256::from(block).to_be_bytes::<32>()),
        "blockNumber": format!("0x{block:x}"),
        "gasUsed": format!("0x{GAS_USED:x}"),
        "effectiveGasPrice": format!("0x{:x}", tx.gas_price().unwrap_or_default()),
        "from": from,
        "to": tx.to(),
        "contractAddress": contract_address,
    });
    state.receipts.insert(hash, receipt);
    state
        .pending_polls
        .insert(hash, state.receipt_delay.load(Ordering::Acquire));
    state.sent.lock().push(tx);

    Ok(json!(hash))
}

fn transaction_count(params: &[Value], state: &NodeState) -> Value {
    let nonce = param::<Address>(params, 0)
        .and_then(|address| state.nonces.get(&address).map(|nonce| *nonce))
        .unwrap_or(0);
    json!(format!("0x{nonce:x}"))
}

fn transaction_receipt(params: &[Value], state: &NodeState) -> Value {
    let Some(hash) = param::<B256>(params, 0) else {
        return Value::Null;
    };

    if let Some(mut remaining) = state.pending_polls.get_mut(&hash)
        && *remaining > 0
    {
        *remaining -= 1;
        return Value::Null;
    }

    state
        .receipts
        .get(&hash)
        .map(|receipt| receipt.clone())
        .unwrap_or(Value::Null)
}

fn call(params: &[Value], state: &NodeState) -> Value {
    let to = params
        .first()
        .and_then(|request| request.get("to"))
        .and_then(|to| serde_json::from_value::<Address>(to.clone()).ok());

    let output = to
        .and_then(|to| state.call_responses.get(&to).map(|data| data.clone()))
        .unwrap_or_else(|| Bytes::from(vec![0u8; 32]));
    json!(output)
}

fn code_at(params: &[Value], state: &NodeState) -> Value {
    let code = param::<Address>(params, 0)
        .and_then(|address| state.code.get(&address).map(|code| code.clone()))
        .unwrap_or_default();
    json!(code)
}
