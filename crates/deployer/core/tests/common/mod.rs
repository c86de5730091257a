#![allow(dead_code)]

use alloy::{
    hex,
    signers::local::PrivateKeySigner,
};
use alloy_json_abi::JsonAbi;
use deployer_core::{
    artifacts::{
        Artifacts,
        abi_path,
        bytecode_path,
    },
    ledger::AddressLedger,
    orchestrator::RunOptions,
    plan::DeploymentPlan,
    rpc::HttpRpcClient,
    submitter::TransactionSubmitter,
};
use int_test_utils::MockNode;
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
    time::Duration,
};
use tempfile::TempDir;

pub const GAS_PRICE_WEI: u128 = 1_000_000_000;

const BYTECODE: [u8; 4] = [0x60, 0x80, 0x60, 0x40];

/// ABIs of the `.crypto` contracts, trimmed to what the plan touches.
pub fn dot_crypto_abis() -> Vec<(&'static str, Vec<&'static str>)> {
    let controller = vec![
        "constructor(address registry)",
        "function addMinter(address account)",
    ];
    vec![
        (
            "Registry",
            vec![
                "function addController(address account)",
                "function renounceController()",
                "function ownerOf(uint256 tokenId) view returns (address)",
            ],
        ),
        ("SignatureController", controller.clone()),
        ("MintingController", controller.clone()),
        ("URIPrefixController", controller),
        (
            "WhitelistedMinter",
            vec![
                "constructor(address controller)",
                "function addWhitelisted(address account)",
                "function setDefaultResolver(address resolver)",
            ],
        ),
        (
            "Resolver",
            vec![
                "constructor(address registry, address mintingController)",
                "function reset(uint256 tokenId)",
                "function resetFor(uint256 tokenId, bytes signature)",
                "function nonceOf(address account) view returns (uint256)",
                "function relay(bytes data, bytes signature) returns (bytes)",
            ],
        ),
    ]
}

pub fn write_artifacts(dir: &Path) {
    std::fs::create_dir_all(dir.join("json")).unwrap();
    std::fs::create_dir_all(dir.join("bin")).unwrap();
    for (name, items) in dot_crypto_abis() {
        let abi = JsonAbi::parse(items).unwrap();
        std::fs::write(abi_path(dir, name), serde_json::to_string(&abi).unwrap()).unwrap();
        std::fs::write(bytecode_path(dir, name), hex::encode_prefixed(BYTECODE)).unwrap();
    }
}

/// A mock node, an operator key and a scratch directory holding artifacts and the ledger.
pub struct TestContext {
    pub node: MockNode,
    pub submitter: TransactionSubmitter,
    pub signer: PrivateKeySigner,
    pub dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let node = MockNode::new().await.unwrap();
        let client = HttpRpcClient::new(&node.http_url()).unwrap();
        let submitter = TransactionSubmitter::new(Arc::new(client))
            .with_poll_interval(Duration::from_millis(5));
        let dir = TempDir::new().unwrap();
        write_artifacts(&dir.path().join("artifacts"));

        Self {
            node,
            submitter,
            signer: PrivateKeySigner::random(),
            dir,
        }
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("ledger.json")
    }

    pub fn open_ledger(&self) -> AddressLedger {
        AddressLedger::open_file(self.ledger_path()).unwrap()
    }

    pub fn artifacts(&self, plan: &DeploymentPlan, start: usize) -> Artifacts {
        Artifacts::load_dir(
            &self.artifacts_dir(),
            plan.artifacts_from(start),
            plan.bytecode_from(start, |_| true),
        )
        .unwrap()
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            gas_price_wei: GAS_PRICE_WEI,
            ..Default::default()
        }
    }
}
