//! Error types for every stage of the deployment and transaction pipeline.

use alloy::{
    primitives::{
        Address,
        B256,
    },
    transports::TransportError,
};

/// Errors raised while looking up ABI entries and encoding calls.
#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    /// Zero or several ABI entries match the method name and argument count
    #[error("Expected exactly one ABI entry named '{method}' taking {arity} arguments, found {matches}")]
    BadAbiEntry {
        method: String,
        arity: usize,
        matches: usize,
    },

    #[error("Error parsing ABI type '{ty}': {source}")]
    Type {
        ty: String,
        #[source]
        source: alloy_dyn_abi::Error,
    },

    #[error("Cannot use '{value}' as {ty}: {source}")]
    Coerce {
        ty: String,
        value: String,
        #[source]
        source: alloy_dyn_abi::Error,
    },

    #[error("Constructor takes {expected} arguments, got {actual}")]
    ConstructorArity { expected: usize, actual: usize },

    #[error("Dynamic ABI Error: {0}")]
    Encode(#[from] alloy_dyn_abi::Error),
}

/// Errors raised while building or checking authorization signatures.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Failed to sign digest: {0}")]
    Signing(#[from] alloy::signers::Error),
}

/// Errors raised by the JSON-RPC transport.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("JSON-RPC error code {code}: {message}")]
    JsonRpc { code: i64, message: String },
    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        match err.as_error_resp() {
            Some(payload) => {
                Self::JsonRpc {
                    code: payload.code,
                    message: payload.message.to_string(),
                }
            }
            None => Self::Transport(err),
        }
    }
}

/// Terminal failures of a single transaction submission.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Gas estimation reverted; nothing was broadcast
    #[error("Bad simulation (estimateGas): {reason}")]
    SimulationFailed { reason: String },

    /// The transaction was mined with a failure status
    #[error("Transaction {tx_hash} was mined but reverted")]
    RevertedExecution { tx_hash: B256 },

    #[error("Failed to sign transaction: {0}")]
    Signing(#[from] alloy::signers::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Errors raised while deploying a single contract.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Deployment of {contract} reverted in transaction {tx_hash}")]
    DeploymentReverted { contract: String, tx_hash: B256 },

    #[error("Receipt {tx_hash} for {contract} carries no contract address")]
    MissingContractAddress { contract: String, tx_hash: B256 },

    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Submit(SubmitError),
}

impl DeployError {
    /// Maps a submission failure of a creation transaction, turning reverts into
    /// [`DeployError::DeploymentReverted`].
    pub fn from_submit(contract: &str, error: SubmitError) -> Self {
        match error {
            SubmitError::RevertedExecution { tx_hash } => {
                Self::DeploymentReverted {
                    contract: contract.to_string(),
                    tx_hash,
                }
            }
            other => Self::Submit(other),
        }
    }
}

/// Errors raised by the address ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{name} is already deployed at {address}; pass --force to overwrite it")]
    AlreadyDeployed { name: String, address: Address },

    #[error("Failed to read ledger at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write ledger at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse ledger at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised while loading contract artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("No artifact loaded for contract '{0}'")]
    Missing(String),

    #[error("No bytecode loaded for contract '{0}'")]
    MissingBytecode(String),

    #[error("Failed to read artifact {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse ABI {path}: {source}")]
    ParseAbi {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode bytecode {path}: {source}")]
    Bytecode {
        path: String,
        #[source]
        source: alloy::hex::FromHexError,
    },
}

/// Errors raised while building or loading a deployment plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Deployment plan has no steps")]
    Empty,

    #[error("Step {found} is out of order, expected step {expected}")]
    OutOfOrder { expected: usize, found: usize },

    #[error("Step {step} needs {contract}, which is only produced by later step {producer}")]
    ForwardReference {
        step: usize,
        contract: String,
        producer: usize,
    },

    #[error("Failed to read plan {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse plan {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The reason a step's action failed.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Abi(#[from] AbiError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Errors that halt a deployment run.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Local pre-flight failure; no network action was taken
    #[error(
        "Step {step} ({name}) needs the address of {contract}; supply it and re-run from step {step}"
    )]
    MissingPrerequisite {
        step: usize,
        name: String,
        contract: String,
    },

    #[error("Step {step} ({name}) failed: {source}")]
    StepFailed {
        step: usize,
        name: String,
        #[source]
        source: StepError,
    },

    #[error("Cannot start at step {start}, the plan has steps 1..={len}")]
    InvalidStart { start: usize, len: usize },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl OrchestratorError {
    /// Step index the run halted at, if the error belongs to a step.
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::MissingPrerequisite { step, .. } | Self::StepFailed { step, .. } => Some(*step),
            Self::InvalidStart { .. } | Self::Ledger(_) => None,
        }
    }
}

/// Errors raised while preparing a relayed authorization.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Abi(#[from] AbiError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("Unexpected authorization nonce response: {0}")]
    NonceDecode(String),
}

/// Errors raised while reading CLI configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Bad private key")]
    BadPrivateKey,

    #[error("No private key configured; pass --private-key or set DEPLOYER_PRIVATE_KEY")]
    MissingPrivateKey,

    #[error("No RPC URL configured; pass --url or set DEPLOYER_RPC_URL")]
    MissingRpcUrl,

    #[error("Could not determine the home directory for the config dir")]
    HomeDirNotFound,
}

/// Errors surfaced by the CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Abi(#[from] AbiError),
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Prompt failed: {0}")]
    Prompt(#[from] inquire::InquireError),

    #[error("Invalid value '{value}': {reason}")]
    InvalidValue { value: String, reason: String },

    #[error("No address for {0}; pass --to or record it in the ledger")]
    UnknownAddress(String),

    #[error("Contract does not exist at {0}. Maybe you put in the wrong one?")]
    NoCode(Address),

    #[error("Stopping...")]
    Aborted,
}
