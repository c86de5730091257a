//! `deployer call`: reads from or sends a transaction to a deployed contract.

use crate::{
    abi,
    artifacts,
    config::{
        CliConfig,
        NetworkArgs,
    },
    error::CommandError,
    ledger::AddressLedger,
    rpc::{
        BlockNumberOrTag,
        Receipt,
        RpcNode,
        read_request,
    },
    submitter::{
        TransactionCall,
        TransactionSubmitter,
    },
};

use alloy::{
    primitives::{
        Address,
        U256,
        utils::{
            format_ether,
            parse_ether,
        },
    },
    signers::local::PrivateKeySigner,
};
use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::Function;
use clap::{
    Parser,
    ValueHint,
};
use colored::Colorize;
use deployer_common::{
    args::CliArgs,
    contract_name,
};
use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use inquire::Confirm;
use serde_json::json;
use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

#[derive(Debug, Parser)]
#[clap(
    name = "call",
    about = "Call a method on a deployed contract",
    long_about = "Call a method on a deployed contract. View and pure methods are read with eth_call; every other method is sent as a transaction after confirmation."
)]
pub struct CallArgs {
    #[command(flatten)]
    pub network: NetworkArgs,

    /// Contract name as recorded in the ledger, e.g. `registry` or `WhitelistedMinter`
    #[clap(value_name = "CONTRACT")]
    pub contract: String,

    #[clap(value_name = "METHOD")]
    pub method: String,

    #[clap(value_name = "ARGS", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Address to call instead of the ledger entry
    #[clap(long)]
    pub to: Option<Address>,

    /// Ether sent with the call
    #[clap(long, value_name = "AMOUNT")]
    pub value: Option<String>,

    /// Read `--value` as wei instead of ether
    #[clap(long, requires = "value")]
    pub wei: bool,

    #[clap(long, value_hint = ValueHint::DirPath)]
    pub artifacts: Option<PathBuf>,

    #[clap(long, value_hint = ValueHint::FilePath)]
    pub ledger: Option<PathBuf>,

    /// Do not ask for confirmation
    #[clap(long, short = 'y')]
    pub yes: bool,
}

/// What a call produced.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Read(Vec<DynSolValue>),
    Sent(Receipt),
}

impl CallArgs {
    pub async fn run(
        &self,
        cli_args: &CliArgs,
        config: &CliConfig,
    ) -> Result<CallOutcome, CommandError> {
        let name = contract_name(&self.contract);
        let artifacts_dir = self
            .artifacts
            .clone()
            .unwrap_or_else(|| config.artifacts_dir());
        let contract_abi = artifacts::load_abi(&artifacts_dir, &name)?;
        let function = abi::find_function(&contract_abi, &self.method, self.args.len())?;

        let ledger_path = match &self.ledger {
            Some(path) => path.clone(),
            None => CliConfig::ledger_path(cli_args)?,
        };
        let to = resolve_target(self.to, &name, &ledger_path)?;

        let submitter = self.network.submitter(config)?;
        ensure_code(submitter.node().as_ref(), to).await?;

        let json_output = cli_args.json_output();
        if abi::is_read_only(function) {
            let values = read(submitter.node().as_ref(), to, function, &self.args).await?;
            display_read(&values, json_output);
            return Ok(CallOutcome::Read(values));
        }

        let signer = self.network.signer(config)?;
        let value = match &self.value {
            Some(value) => parse_value(value, self.wei)?,
            None => U256::ZERO,
        };
        let call = TransactionCall::call(
            to,
            abi::encode_function(function, &self.args)?,
            self.network.gas_price_wei(config),
        )
        .with_value(value);

        let gas = submitter.estimate(&call, signer.address()).await?;
        let cost = estimated_cost(gas, call.gas_price_wei, value);
        if !json_output {
            println!(
                "{} {}.{} costs up to {} ETH ({gas} gas)",
                "Calling".bold(),
                name,
                self.method,
                format_ether(cost)
            );
            if !self.yes && !Confirm::new("Send the transaction?").with_default(true).prompt()? {
                return Err(CommandError::Aborted);
            }
        }

        let receipt = send(&submitter, call, &signer, json_output).await?;
        display_receipt(&receipt, json_output);
        Ok(CallOutcome::Sent(receipt))
    }
}

/// Address to call: `to` if given, the ledger entry for `name` otherwise.
pub fn resolve_target(
    to: Option<Address>,
    name: &str,
    ledger_path: &Path,
) -> Result<Address, CommandError> {
    if let Some(to) = to {
        return Ok(to);
    }
    AddressLedger::open_file(ledger_path)?
        .get(name)
        .ok_or_else(|| CommandError::UnknownAddress(name.to_string()))
}

/// Fails with [`CommandError::NoCode`] if nothing is deployed at `address`.
pub async fn ensure_code(node: &dyn RpcNode, address: Address) -> Result<(), CommandError> {
    if node.code_at(address).await?.is_empty() {
        return Err(CommandError::NoCode(address));
    }
    Ok(())
}

/// Runs a read-only call and decodes its outputs.
pub async fn read(
    node: &dyn RpcNode,
    to: Address,
    function: &Function,
    args: &[String],
) -> Result<Vec<DynSolValue>, CommandError> {
    let data = abi::encode_function(function, args)?;
    let output = node
        .call(&read_request(to, data), BlockNumberOrTag::Latest)
        .await?;
    Ok(abi::decode_output(function, &output)?)
}

/// Upper bound of what a transaction costs: `gas * gas price + value`.
pub fn estimated_cost(gas: u64, gas_price_wei: u128, value: U256) -> U256 {
    U256::from(gas) * U256::from(gas_price_wei) + value
}

/// Parses an amount in ether, or in wei when `wei` is set.
pub fn parse_value(value: &str, wei: bool) -> Result<U256, CommandError> {
    let parsed = if wei {
        value.parse::<U256>().map_err(|err| err.to_string())
    } else {
        parse_ether(value).map_err(|err| err.to_string())
    };
    parsed.map_err(|reason| {
        CommandError::InvalidValue {
            value: value.to_string(),
            reason,
        }
    })
}

pub(crate) async fn send(
    submitter: &TransactionSubmitter,
    call: TransactionCall,
    signer: &PrivateKeySigner,
    json_output: bool,
) -> Result<Receipt, CommandError> {
    let spinner = (!json_output).then(create_spinner);
    if let Some(spinner) = &spinner {
        spinner.set_message("Waiting for the transaction to be mined...");
    }

    let result = submitter.submit(call, signer).await;
    if let Some(spinner) = spinner {
        match &result {
            Ok(_) => spinner.finish_with_message("✅ Transaction mined"),
            Err(err) => spinner.finish_with_message(format!("❌ {err}")),
        }
    }
    Ok(result?)
}

fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Outputs joined by spaces.
pub fn format_outputs(values: &[DynSolValue]) -> String {
    values
        .iter()
        .map(abi::format_value)
        .collect::<Vec<_>>()
        .join(" ")
}

fn display_read(values: &[DynSolValue], json_output: bool) {
    if json_output {
        let outputs: Vec<String> = values.iter().map(abi::format_value).collect();
        println!("{:#}", json!({ "status": "success", "outputs": outputs }));
    } else {
        println!("{}", format_outputs(values));
    }
}

fn display_receipt(receipt: &Receipt, json_output: bool) {
    if json_output {
        println!(
            "{:#}",
            json!({
                "status": "success",
                "transactionHash": receipt.transaction_hash,
                "blockNumber": receipt.block_number,
                "gasUsed": receipt.gas_used,
            })
        );
    } else {
        println!("Transaction: {}", receipt.transaction_hash.to_string().cyan());
        println!("Gas used:    {}", receipt.gas_used);
    }
}
