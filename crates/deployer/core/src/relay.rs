//! Client side of relayed (meta) transactions.
//!
//! A signer authorizes a call off-chain; any account can then submit the encoded call together
//! with the signature. The target contract recovers the signer from the digest, checks its
//! per-signer nonce and dispatches the call as if the signer had sent it.

use crate::{
    abi,
    error::RelayError,
    hasher::{
        self,
        HashScheme,
    },
    rpc::{
        BlockNumberOrTag,
        RpcNode,
        read_request,
    },
};

use alloy::{
    hex,
    primitives::{
        Address,
        B256,
        Bytes,
        U256,
    },
    signers::local::PrivateKeySigner,
};
use alloy_json_abi::{
    Function,
    JsonAbi,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::sync::Arc;
use tracing::debug;

/// View function returning the authorization nonce of an account.
pub const NONCE_FUNCTION: &str = "function nonceOf(address account) view returns (uint256)";

/// Generic entry point of relay-capable contracts.
pub const RELAY_METHOD: &str = "relay";

/// Suffix of the signed variant of a method, e.g. `transferFromFor`.
pub const SIGNED_VARIANT_SUFFIX: &str = "For";

/// Name of the signed variant of `method`. A name that already carries the suffix is kept.
pub fn signed_variant_name(method: &str) -> String {
    if method.ends_with(SIGNED_VARIANT_SUFFIX) {
        method.to_string()
    } else {
        format!("{method}{SIGNED_VARIANT_SUFFIX}")
    }
}

/// Name of the plain method behind a signed variant.
pub fn base_method_name(method: &str) -> &str {
    method
        .strip_suffix(SIGNED_VARIANT_SUFFIX)
        .filter(|base| !base.is_empty())
        .unwrap_or(method)
}

/// Entry point a relayer submits the authorization through.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Submission {
    /// `relay(bytes data, bytes signature)` on the target
    #[default]
    Relay,
    /// `<method>For(args..., bytes signature)` on the target
    SignedMethod,
}

impl std::fmt::Display for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relay => write!(f, "relay"),
            Self::SignedMethod => write!(f, "signed-method"),
        }
    }
}

/// Digest construction together with the entry point the signature is meant for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignMode {
    pub scheme: HashScheme,
    pub submission: Submission,
}

impl SignMode {
    pub fn new(scheme: HashScheme, submission: Submission) -> Self {
        Self { scheme, submission }
    }

    /// Method name and calldata the digest is computed over.
    ///
    /// The relay entry point dispatches `method(args)` as encoded. Signed variants under
    /// [`HashScheme::DoubleHash`] cover the variant's own calldata with an empty signature;
    /// under [`HashScheme::SaltedTriple`] they cover the plain method's calldata.
    pub fn authorized_call<S: AsRef<str>>(
        &self,
        abi: &JsonAbi,
        method: &str,
        args: &[S],
    ) -> Result<(String, Bytes), RelayError> {
        match (self.submission, self.scheme) {
            (Submission::Relay, _) => {
                Ok((method.to_string(), abi::encode_call(abi, method, args)?))
            }
            (Submission::SignedMethod, HashScheme::DoubleHash) => {
                let mut unsigned: Vec<&str> = args.iter().map(|arg| arg.as_ref()).collect();
                unsigned.push("0x");
                let encoded = abi::encode_call(abi, &signed_variant_name(method), &unsigned)?;
                Ok((base_method_name(method).to_string(), encoded))
            }
            (Submission::SignedMethod, HashScheme::SaltedTriple) => {
                let base = base_method_name(method);
                Ok((base.to_string(), abi::encode_call(abi, base, args)?))
            }
        }
    }
}

impl From<HashScheme> for SignMode {
    fn from(scheme: HashScheme) -> Self {
        Self {
            scheme,
            submission: Submission::default(),
        }
    }
}

/// A signed authorization, ready to be submitted by a relayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPayload {
    pub target: Address,
    pub signer: Address,
    pub method: String,
    pub args: Vec<String>,
    pub scheme: HashScheme,
    pub submission: Submission,
    pub nonce: U256,
    pub digest: B256,
    pub encoded_call: Bytes,
    pub signature: Bytes,
}

impl RelayPayload {
    /// Calldata for the entry point the authorization was signed for.
    pub fn calldata(&self, abi: &JsonAbi) -> Result<Bytes, RelayError> {
        match self.submission {
            Submission::Relay => self.relay_calldata(abi),
            Submission::SignedMethod => self.signed_variant_calldata(abi),
        }
    }

    /// Calldata for `relay(bytes data, bytes signature)` on the target.
    pub fn relay_calldata(&self, abi: &JsonAbi) -> Result<Bytes, RelayError> {
        let function = abi::find_function(abi, RELAY_METHOD, 2)?;
        Ok(abi::encode_function(
            function,
            &[hex::encode_prefixed(&self.encoded_call), hex::encode_prefixed(&self.signature)],
        )?)
    }

    /// Calldata for `<method>For(args..., bytes signature)` on the target.
    pub fn signed_variant_calldata(&self, abi: &JsonAbi) -> Result<Bytes, RelayError> {
        let method = signed_variant_name(&self.method);
        let mut args = self.args.clone();
        args.push(hex::encode_prefixed(&self.signature));
        Ok(abi::encode_call(abi, &method, &args)?)
    }
}

/// Prepares relayed authorizations against a node.
pub struct RelayDispatcher {
    node: Arc<dyn RpcNode>,
    mode: SignMode,
}

impl RelayDispatcher {
    pub fn new(node: Arc<dyn RpcNode>, mode: impl Into<SignMode>) -> Self {
        Self {
            node,
            mode: mode.into(),
        }
    }

    pub fn scheme(&self) -> HashScheme {
        self.mode.scheme
    }

    pub fn mode(&self) -> SignMode {
        self.mode
    }

    /// Reads the current authorization nonce of `account` on `contract`.
    pub async fn authorization_nonce(
        &self,
        contract: Address,
        account: Address,
    ) -> Result<U256, RelayError> {
        let function = Function::parse(NONCE_FUNCTION)
            .map_err(|err| RelayError::NonceDecode(err.to_string()))?;
        let data = abi::encode_function(&function, &[account.to_string()])?;

        let output = self
            .node
            .call(&read_request(contract, data), BlockNumberOrTag::Latest)
            .await?;
        let values = abi::decode_output(&function, &output)
            .map_err(|err| RelayError::NonceDecode(err.to_string()))?;

        let nonce = values
            .first()
            .and_then(|value| value.as_uint())
            .map(|(nonce, _)| nonce)
            .ok_or_else(|| RelayError::NonceDecode(format!("0x{}", hex::encode(&output))))?;

        debug!(target: "relay", %contract, %account, %nonce, "Read authorization nonce");
        Ok(nonce)
    }

    /// Reads the signer's nonce on `contract` and signs `method(args)` with it.
    ///
    /// The nonce is not reserved; two authorizations prepared against the same nonce leave the
    /// later one to revert on chain.
    pub async fn prepare_relay<S: AsRef<str>>(
        &self,
        abi: &JsonAbi,
        method: &str,
        args: &[S],
        contract: Address,
        signer: &PrivateKeySigner,
    ) -> Result<RelayPayload, RelayError> {
        let nonce = self
            .authorization_nonce(contract, signer.address())
            .await?;
        sign_with_nonce(abi, method, args, contract, nonce, signer, self.mode)
    }
}

/// Signs `method(args)` for `contract` with a known nonce.
///
/// A bare [`HashScheme`] signs for the relay entry point.
pub fn sign_with_nonce<S: AsRef<str>>(
    abi: &JsonAbi,
    method: &str,
    args: &[S],
    contract: Address,
    nonce: U256,
    signer: &PrivateKeySigner,
    mode: impl Into<SignMode>,
) -> Result<RelayPayload, RelayError> {
    let mode = mode.into();
    let (method, encoded_call) = mode.authorized_call(abi, method, args)?;
    let digest = hasher::digest_for_encoded(&encoded_call, contract, nonce, mode.scheme);
    let signature = hasher::sign_digest(signer, digest)?;

    Ok(RelayPayload {
        target: contract,
        signer: signer.address(),
        method,
        args: args.iter().map(|arg| arg.as_ref().to_string()).collect(),
        scheme: mode.scheme,
        submission: mode.submission,
        nonce,
        digest,
        encoded_call,
        signature,
    })
}
