//! `deployer sign`: authorizes a call off-chain and optionally relays it.

use crate::{
    artifacts,
    call_command::{
        ensure_code,
        resolve_target,
        send,
    },
    config::{
        CliConfig,
        NetworkArgs,
        load_signer,
    },
    error::{
        CommandError,
        ConfigError,
    },
    hasher::HashScheme,
    relay::{
        self,
        RelayDispatcher,
        RelayPayload,
        SignMode,
        Submission,
    },
    rpc::{
        Receipt,
        RpcNode,
    },
    submitter::{
        TransactionCall,
        TransactionSubmitter,
    },
};

use alloy::{
    hex,
    primitives::{
        Address,
        U256,
    },
    signers::local::PrivateKeySigner,
};
use alloy_json_abi::JsonAbi;
use clap::{
    Parser,
    ValueHint,
};
use colored::Colorize;
use deployer_common::{
    args::CliArgs,
    contract_name,
};
use serde_json::json;
use std::{
    path::PathBuf,
    sync::Arc,
};
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "sign",
    about = "Sign an authorization for a relayed call",
    long_about = "Sign an authorization for a relayed call. The signature lets any account submit the call on the signer's behalf, either through relay(bytes,bytes) or through the method's signed variant (--via signed-method)."
)]
pub struct SignArgs {
    #[command(flatten)]
    pub network: NetworkArgs,

    #[clap(value_name = "CONTRACT")]
    pub contract: String,

    #[clap(value_name = "METHOD")]
    pub method: String,

    #[clap(value_name = "ARGS", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Digest construction the target contract verifies
    #[clap(long, value_enum, default_value_t = HashScheme::DoubleHash)]
    pub scheme: HashScheme,

    /// Authorization nonce to sign with instead of reading it from the contract
    #[clap(long)]
    pub nonce: Option<U256>,

    /// Address of the target instead of the ledger entry
    #[clap(long)]
    pub to: Option<Address>,

    /// Entry point the authorization is signed for and submitted through
    #[clap(long, value_enum, default_value_t = Submission::Relay)]
    pub via: Submission,

    /// Submit the authorization from the relayer account
    #[clap(long)]
    pub relay: bool,

    /// Key of the account paying for the relay. Defaults to the signing key.
    #[clap(
        long,
        env = "DEPLOYER_RELAYER_KEY",
        hide_env_values = true,
        requires = "relay",
        value_name = "KEY"
    )]
    pub relayer_key: Option<String>,

    #[clap(long, value_hint = ValueHint::DirPath)]
    pub artifacts: Option<PathBuf>,

    #[clap(long, value_hint = ValueHint::FilePath)]
    pub ledger: Option<PathBuf>,
}

impl SignArgs {
    pub async fn run(
        &self,
        cli_args: &CliArgs,
        config: &CliConfig,
    ) -> Result<RelayPayload, CommandError> {
        let name = contract_name(&self.contract);
        let artifacts_dir = self
            .artifacts
            .clone()
            .unwrap_or_else(|| config.artifacts_dir());
        let abi = artifacts::load_abi(&artifacts_dir, &name)?;

        let ledger_path = match &self.ledger {
            Some(path) => path.clone(),
            None => CliConfig::ledger_path(cli_args)?,
        };
        let to = resolve_target(self.to, &name, &ledger_path)?;
        let signer = self.network.signer(config)?;

        // Signing with a given nonce works offline
        let submitter = if self.nonce.is_none() || self.relay {
            Some(self.network.submitter(config)?)
        } else {
            None
        };

        let payload = self
            .authorize(
                &abi,
                to,
                &signer,
                submitter.as_ref().map(|submitter| submitter.node().clone()),
            )
            .await?;

        let json_output = cli_args.json_output();
        let receipt = match &submitter {
            Some(submitter) if self.relay => {
                let relayer = match &self.relayer_key {
                    Some(key) => load_signer(key)?,
                    None => signer.clone(),
                };
                let gas_price_wei = self.network.gas_price_wei(config);
                Some(
                    submit_relay(submitter, &abi, &payload, &relayer, gas_price_wei, json_output)
                        .await?,
                )
            }
            _ => None,
        };

        display(&payload, receipt.as_ref(), json_output);
        Ok(payload)
    }

    pub fn mode(&self) -> SignMode {
        SignMode::new(self.scheme, self.via)
    }

    /// Signs the call with `--nonce`, or with the nonce read from the target through `node`.
    pub async fn authorize(
        &self,
        abi: &JsonAbi,
        to: Address,
        signer: &PrivateKeySigner,
        node: Option<Arc<dyn RpcNode>>,
    ) -> Result<RelayPayload, CommandError> {
        if let Some(nonce) = self.nonce {
            return Ok(relay::sign_with_nonce(
                abi,
                &self.method,
                &self.args,
                to,
                nonce,
                signer,
                self.mode(),
            )?);
        }

        let node = node.ok_or(ConfigError::MissingRpcUrl)?;
        Ok(RelayDispatcher::new(node, self.mode())
            .prepare_relay(abi, &self.method, &self.args, to, signer)
            .await?)
    }
}

/// Sends `payload` from `relayer` through the entry point it was signed for.
pub async fn submit_relay(
    submitter: &TransactionSubmitter,
    abi: &JsonAbi,
    payload: &RelayPayload,
    relayer: &PrivateKeySigner,
    gas_price_wei: u128,
    json_output: bool,
) -> Result<Receipt, CommandError> {
    ensure_code(submitter.node().as_ref(), payload.target).await?;
    let call = TransactionCall::call(payload.target, payload.calldata(abi)?, gas_price_wei);

    info!(
        target: "sign",
        relayer = %relayer.address(),
        signer = %payload.signer,
        target_contract = %payload.target,
        via = %payload.submission,
        "Relaying authorization"
    );
    send(submitter, call, relayer, json_output).await
}

fn display(payload: &RelayPayload, receipt: Option<&Receipt>, json_output: bool) {
    if json_output {
        let mut output = json!({
            "status": "success",
            "authorization": payload,
        });
        if let Some(receipt) = receipt {
            output["transactionHash"] = json!(receipt.transaction_hash);
        }
        println!("{output:#}");
        return;
    }

    println!("{}", "Authorization".bold().green());
    println!("{}", "=============".green());
    println!("Target:    {}", payload.target);
    println!("Signer:    {}", payload.signer);
    println!("Call:      {}({})", payload.method, payload.args.join(", "));
    println!("Scheme:    {}", payload.scheme);
    println!("Via:       {}", payload.submission);
    println!("Nonce:     {}", payload.nonce);
    println!("Digest:    {}", payload.digest);
    println!("Data:      {}", hex::encode_prefixed(&payload.encoded_call));
    println!("Signature: {}", hex::encode_prefixed(&payload.signature).cyan());
    if let Some(receipt) = receipt {
        println!("\nRelayed in {}", receipt.transaction_hash.to_string().cyan());
    }
}
