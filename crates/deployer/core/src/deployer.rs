use crate::{
    abi,
    artifacts::ContractArtifact,
    error::{
        ArtifactError,
        DeployError,
    },
    rpc::Receipt,
    submitter::{
        TransactionCall,
        TransactionSubmitter,
    },
};

use alloy::{
    primitives::{
        Address,
        Bytes,
    },
    signers::local::PrivateKeySigner,
};
use alloy_json_abi::JsonAbi;
use tracing::info;

/// A contract that was created on chain.
#[derive(Debug, Clone)]
pub struct DeployedContract {
    pub name: String,
    pub address: Address,
    pub abi: JsonAbi,
    pub receipt: Receipt,
}

/// Creates contracts through a [`TransactionSubmitter`].
#[derive(Debug, Clone, Copy)]
pub struct ContractDeployer<'a> {
    submitter: &'a TransactionSubmitter,
}

impl<'a> ContractDeployer<'a> {
    pub fn new(submitter: &'a TransactionSubmitter) -> Self {
        Self { submitter }
    }

    /// Deploys `artifact` with its constructor arguments appended to the bytecode.
    pub async fn deploy(
        &self,
        name: &str,
        artifact: &ContractArtifact,
        constructor_args: &[String],
        signer: &PrivateKeySigner,
        gas_price_wei: u128,
    ) -> Result<DeployedContract, DeployError> {
        let bytecode = artifact
            .bytecode
            .as_ref()
            .ok_or_else(|| ArtifactError::MissingBytecode(name.to_string()))?;
        let encoded_args = abi::encode_constructor(&artifact.abi, constructor_args)?;
        let init_code: Bytes = [bytecode.as_ref(), encoded_args.as_ref()]
            .concat()
            .into();

        info!(target: "deployer", contract = name, args = ?constructor_args, "Deploying contract");
        let (address, receipt) = self
            .create(name, init_code, signer, gas_price_wei)
            .await?;

        Ok(DeployedContract {
            name: name.to_string(),
            address,
            abi: artifact.abi.clone(),
            receipt,
        })
    }

    /// Deploys an ERC-1167 minimal proxy forwarding every call to `implementation`.
    pub async fn deploy_proxy(
        &self,
        name: &str,
        implementation: Address,
        abi: &JsonAbi,
        signer: &PrivateKeySigner,
        gas_price_wei: u128,
    ) -> Result<DeployedContract, DeployError> {
        info!(target: "deployer", contract = name, %implementation, "Deploying proxy");
        let (address, receipt) = self
            .create(
                name,
                minimal_proxy_init_code(implementation),
                signer,
                gas_price_wei,
            )
            .await?;

        Ok(DeployedContract {
            name: name.to_string(),
            address,
            abi: abi.clone(),
            receipt,
        })
    }

    async fn create(
        &self,
        name: &str,
        init_code: Bytes,
        signer: &PrivateKeySigner,
        gas_price_wei: u128,
    ) -> Result<(Address, Receipt), DeployError> {
        let receipt = self
            .submitter
            .submit(TransactionCall::create(init_code, gas_price_wei), signer)
            .await
            .map_err(|err| DeployError::from_submit(name, err))?;

        let address = receipt.contract_address.ok_or_else(|| {
            DeployError::MissingContractAddress {
                contract: name.to_string(),
                tx_hash: receipt.transaction_hash,
            }
        })?;

        info!(target: "deployer", contract = name, %address, tx_hash = %receipt.transaction_hash, "Contract deployed");
        Ok((address, receipt))
    }
}

const PROXY_RUNTIME_PREFIX: [u8; 10] = [0x36, 0x3d, 0x3d, 0x37, 0x3d, 0x3d, 0x3d, 0x36, 0x3d, 0x73];
const PROXY_RUNTIME_SUFFIX: [u8; 15] = [
    0x5a, 0xf4, 0x3d, 0x82, 0x80, 0x3e, 0x90, 0x3d, 0x91, 0x60, 0x2b, 0x57, 0xfd, 0x5b, 0xf3,
];
const PROXY_INIT_PREFIX: [u8; 10] = [0x3d, 0x60, 0x2d, 0x80, 0x60, 0x0a, 0x3d, 0x39, 0x81, 0xf3];

/// Runtime code of an ERC-1167 proxy for `implementation`.
pub fn minimal_proxy_runtime(implementation: Address) -> Bytes {
    [
        &PROXY_RUNTIME_PREFIX[..],
        implementation.as_slice(),
        &PROXY_RUNTIME_SUFFIX[..],
    ]
    .concat()
    .into()
}

/// Creation code that deploys [`minimal_proxy_runtime`].
pub fn minimal_proxy_init_code(implementation: Address) -> Bytes {
    [
        &PROXY_INIT_PREFIX[..],
        minimal_proxy_runtime(implementation).as_ref(),
    ]
    .concat()
    .into()
}
