//! `deployer deploy`: runs a deployment plan against a node, resuming from any step.

use crate::{
    artifacts::Artifacts,
    config::{
        CliConfig,
        NetworkArgs,
    },
    error::CommandError,
    ledger::AddressLedger,
    orchestrator::{
        DeploymentOrchestrator,
        DeploymentSummary,
        RunOptions,
    },
    plan::DeploymentPlan,
    submitter::TransactionSubmitter,
};

use alloy::{
    primitives::Address,
    signers::local::PrivateKeySigner,
};
use clap::{
    Parser,
    ValueHint,
};
use colored::Colorize;
use deployer_common::args::CliArgs;
use inquire::Confirm;
use serde_json::json;
use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use tracing::info;

const DEPLOY_AFTER_HELP: &str = "EXAMPLES:\n    \
    Deploy everything from scratch:\n        \
    deployer deploy --url http://localhost:8545\n\n    \
    Resume at step 4 after fixing the cause of a failure:\n        \
    deployer deploy --step 4\n\n    \
    Start at step 4 with a registry deployed elsewhere:\n        \
    deployer deploy --step 4 --address Registry=0x...";

/// Parses `NAME=ADDRESS`.
pub fn parse_named_address(value: &str) -> Result<(String, Address), String> {
    let (name, address) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=ADDRESS, got '{value}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing contract name in '{value}'"));
    }
    let address = address
        .trim()
        .parse::<Address>()
        .map_err(|err| format!("invalid address for {name}: {err}"))?;
    Ok((deployer_common::contract_name(name), address))
}

#[derive(Debug, Parser)]
#[clap(
    name = "deploy",
    about = "Deploy the contract suite step by step",
    long_about = "Deploy the contract suite step by step. Every completed step is recorded in the ledger, so a failed run can be resumed with --step at the step that failed.",
    after_help = DEPLOY_AFTER_HELP
)]
pub struct DeployArgs {
    #[command(flatten)]
    pub network: NetworkArgs,

    /// Step to start from
    #[clap(long, short = 's', default_value_t = 1, value_name = "STEP")]
    pub step: usize,

    /// Pause between steps that sent a transaction
    #[clap(long = "step-delay-ms", default_value_t = 0, value_name = "MS")]
    pub step_delay_ms: u64,

    /// Record an address before running, for contracts deployed outside this run
    #[clap(
        long = "address",
        short = 'a',
        value_name = "NAME=ADDRESS",
        value_parser = parse_named_address
    )]
    pub addresses: Vec<(String, Address)>,

    /// JSON plan to run instead of the built-in `.crypto` plan
    #[clap(long, value_hint = ValueHint::FilePath)]
    pub plan: Option<PathBuf>,

    /// Directory holding `json/<Name>.json` and `bin/<Name>.bin`
    #[clap(long, value_hint = ValueHint::DirPath)]
    pub artifacts: Option<PathBuf>,

    /// Ledger file, `<config-dir>/ledger.json` by default
    #[clap(long, value_hint = ValueHint::FilePath)]
    pub ledger: Option<PathBuf>,

    /// Redeploy and overwrite contracts the ledger already knows
    #[clap(long)]
    pub force: bool,

    /// Forget every recorded address before running
    #[clap(long, conflicts_with = "addresses")]
    pub fresh: bool,

    /// Do not ask for confirmation
    #[clap(long, short = 'y')]
    pub yes: bool,
}

impl DeployArgs {
    pub async fn run(
        &self,
        cli_args: &CliArgs,
        config: &CliConfig,
    ) -> Result<DeploymentSummary, CommandError> {
        let plan = self.load_plan()?;
        let ledger_path = match &self.ledger {
            Some(path) => path.clone(),
            None => CliConfig::ledger_path(cli_args)?,
        };
        let mut ledger = AddressLedger::open_file(&ledger_path)?;
        self.prepare_ledger(&mut ledger)?;

        let artifacts_dir = self
            .artifacts
            .clone()
            .unwrap_or_else(|| config.artifacts_dir());
        let artifacts = self.load_artifacts(&artifacts_dir, &plan, &ledger)?;

        let signer = self.network.signer(config)?;
        let submitter = self.network.submitter(config)?;
        let gas_price_wei = self.network.gas_price_wei(config);

        info!(
            target: "deploy",
            operator = %signer.address(),
            ledger = %ledger_path.display(),
            start = self.step,
            "Starting deployment"
        );

        let json_output = cli_args.json_output();
        if !json_output && !self.yes {
            self.confirm(&plan, &signer, gas_price_wei)?;
        }

        let options = RunOptions {
            gas_price_wei,
            force: self.force,
            step_delay: Duration::from_millis(self.step_delay_ms),
            progress: !json_output,
        };
        let summary = self
            .deploy(&submitter, &mut ledger, &artifacts, &signer, &plan, options)
            .await?;

        Self::display_summary(&summary, json_output);
        Ok(summary)
    }

    fn load_plan(&self) -> Result<DeploymentPlan, CommandError> {
        Ok(match &self.plan {
            Some(path) => DeploymentPlan::from_file(path)?,
            None => DeploymentPlan::dot_crypto(),
        })
    }

    /// Applies `--fresh` and `--address` to the ledger.
    pub fn prepare_ledger(&self, ledger: &mut AddressLedger) -> Result<(), CommandError> {
        if self.fresh {
            ledger.reset()?;
        }
        for (name, address) in &self.addresses {
            ledger.set(name, *address, self.force)?;
        }
        Ok(())
    }

    /// Loads the artifacts the run needs from `dir`.
    ///
    /// Bytecode is read only for contracts the ledger does not hold yet, or for every deploy step
    /// under `--force`.
    pub fn load_artifacts(
        &self,
        dir: &Path,
        plan: &DeploymentPlan,
        ledger: &AddressLedger,
    ) -> Result<Artifacts, CommandError> {
        let deployables =
            plan.bytecode_from(self.step, |contract| self.force || ledger.get(contract).is_none());
        Ok(Artifacts::load_dir(
            dir,
            plan.artifacts_from(self.step),
            deployables,
        )?)
    }

    /// Runs the plan from `--step`.
    pub async fn deploy(
        &self,
        submitter: &TransactionSubmitter,
        ledger: &mut AddressLedger,
        artifacts: &Artifacts,
        signer: &PrivateKeySigner,
        plan: &DeploymentPlan,
        options: RunOptions,
    ) -> Result<DeploymentSummary, CommandError> {
        let mut orchestrator =
            DeploymentOrchestrator::new(submitter, ledger, artifacts, signer, options);
        Ok(orchestrator.run(plan, self.step).await?)
    }

    fn confirm(
        &self,
        plan: &DeploymentPlan,
        signer: &PrivateKeySigner,
        gas_price_wei: u128,
    ) -> Result<(), CommandError> {
        println!("{}", "Deployment".bold().green());
        println!("{}", "==========".green());
        println!("Operator:  {}", signer.address());
        println!("Steps:     {}..={}", self.step, plan.len());
        println!("Gas price: {} gwei", gas_price_wei / 1_000_000_000);

        let proceed = Confirm::new("Start the deployment?")
            .with_default(true)
            .prompt()?;
        if proceed {
            Ok(())
        } else {
            Err(CommandError::Aborted)
        }
    }

    fn display_summary(summary: &DeploymentSummary, json_output: bool) {
        if json_output {
            let output = json!({
                "status": "success",
                "operator": summary.operator,
                "addresses": summary.addresses,
                "executed": summary.executed,
                "skipped": summary.skipped,
                "transactions": summary.gas.transactions,
                "gasUsed": summary.gas.gas_used,
                "costWei": summary.gas.cost_wei.to_string(),
            });
            println!("{output:#}");
        } else {
            println!("\n{summary}");
        }
    }
}
