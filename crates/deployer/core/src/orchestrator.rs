//! Runs a [`DeploymentPlan`] step by step, resuming from any step.
//!
//! The run is a cursor over step indices that only moves forward. A step's outcome is written
//! to the [`AddressLedger`] before the cursor advances; a failing step halts the run without
//! touching the ledger, so the operator can fix the cause and resume at that step.

use crate::{
    abi,
    artifacts::Artifacts,
    deployer::ContractDeployer,
    error::{
        OrchestratorError,
        StepError,
    },
    ledger::AddressLedger,
    plan::{
        DeploymentPlan,
        PlanArg,
        Step,
        StepAction,
    },
    submitter::{
        GasReport,
        TransactionCall,
        TransactionSubmitter,
    },
};

use alloy::{
    primitives::{
        Address,
        B256,
        U256,
        utils::format_ether,
    },
    signers::local::PrivateKeySigner,
};
use colored::Colorize;
use std::{
    collections::BTreeMap,
    fmt,
    time::Duration,
};
use tracing::{
    info,
    warn,
};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub gas_price_wei: u128,
    /// Re-run steps the ledger already covers and overwrite recorded addresses
    pub force: bool,
    /// Pause after each step that sent a transaction
    pub step_delay: Duration,
    /// Print a banner per step to stdout
    pub progress: bool,
}

/// Position of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Step(usize),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyDeployed(Address),
    AlreadyCompleted,
}

/// What a single step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Deployed { contract: String, address: Address },
    Invoked { tx_hash: B256 },
    Skipped(SkipReason),
}

/// Result of a completed run.
#[derive(Debug, Clone, Default)]
pub struct DeploymentSummary {
    pub operator: Address,
    pub addresses: BTreeMap<String, Address>,
    pub executed: Vec<usize>,
    pub skipped: Vec<usize>,
    pub gas_price_wei: u128,
    pub gas: GasReport,
}

impl fmt::Display for DeploymentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "Deployment Summary".bold().green())?;
        writeln!(f, "{}", "==================".green())?;
        writeln!(f, "Operator: {}", self.operator)?;
        for (name, address) in &self.addresses {
            writeln!(f, "{:>22}: {address}", name.bold())?;
        }
        writeln!(
            f,
            "\nSteps executed: {}, skipped: {}",
            self.executed.len(),
            self.skipped.len()
        )?;
        writeln!(f, "Transactions:   {}", self.gas.transactions)?;
        writeln!(
            f,
            "Gas price:      {} gwei",
            self.gas_price_wei / 1_000_000_000
        )?;
        writeln!(f, "Gas used:       {}", self.gas.gas_used)?;
        write!(f, "Final cost:     {} ETH", format_ether(self.gas.cost_wei))
    }
}

/// Executes deployment plans against a ledger.
pub struct DeploymentOrchestrator<'a> {
    submitter: &'a TransactionSubmitter,
    ledger: &'a mut AddressLedger,
    artifacts: &'a Artifacts,
    signer: &'a PrivateKeySigner,
    options: RunOptions,
}

impl<'a> DeploymentOrchestrator<'a> {
    pub fn new(
        submitter: &'a TransactionSubmitter,
        ledger: &'a mut AddressLedger,
        artifacts: &'a Artifacts,
        signer: &'a PrivateKeySigner,
        options: RunOptions,
    ) -> Self {
        Self {
            submitter,
            ledger,
            artifacts,
            signer,
            options,
        }
    }

    pub fn ledger(&self) -> &AddressLedger {
        self.ledger
    }

    /// Runs `plan` from step `start` until every step is done or one fails.
    ///
    /// `start` may be `plan.len() + 1`, which goes straight to the summary.
    pub async fn run(
        &mut self,
        plan: &DeploymentPlan,
        start: usize,
    ) -> Result<DeploymentSummary, OrchestratorError> {
        if start == 0 || start > plan.len() + 1 {
            return Err(OrchestratorError::InvalidStart {
                start,
                len: plan.len(),
            });
        }

        let gas_before = self.submitter.gas_report();
        let mut summary = DeploymentSummary {
            operator: self.signer.address(),
            gas_price_wei: self.options.gas_price_wei,
            ..Default::default()
        };
        let mut cursor = Cursor::Step(start);

        while let Cursor::Step(index) = cursor {
            let Some(step) = plan.step(index) else {
                cursor = Cursor::Done;
                break;
            };

            info!(target: "orchestrator", step = index, name = %step.name, "Running step");
            let outcome = self.execute(plan, step).await?;
            if self.options.progress {
                println!("{}", step_banner(step, plan.len(), &outcome));
            }
            match outcome {
                StepOutcome::Skipped(reason) => {
                    info!(target: "orchestrator", step = index, ?reason, "Step skipped");
                    summary.skipped.push(index);
                }
                outcome => {
                    info!(target: "orchestrator", step = index, ?outcome, "Step completed");
                    summary.executed.push(index);
                    if !self.options.step_delay.is_zero() && index < plan.len() {
                        tokio::time::sleep(self.options.step_delay).await;
                    }
                }
            }
            cursor = Cursor::Step(index + 1);
        }
        debug_assert_eq!(cursor, Cursor::Done);

        summary.addresses = self.ledger.addresses().clone();
        summary.gas = self.submitter.gas_report().since(&gas_before);
        info!(
            target: "orchestrator",
            executed = summary.executed.len(),
            skipped = summary.skipped.len(),
            gas_used = summary.gas.gas_used,
            "Deployment done"
        );
        Ok(summary)
    }

    async fn execute(
        &mut self,
        plan: &DeploymentPlan,
        step: &Step,
    ) -> Result<StepOutcome, OrchestratorError> {
        if let Some(reason) = self.skip_reason(step) {
            return Ok(StepOutcome::Skipped(reason));
        }
        self.check_prerequisites(step)?;

        let force = self.options.force;
        let gas_price = self.options.gas_price_wei;
        let deployer = ContractDeployer::new(self.submitter);

        match &step.action {
            StepAction::Deploy { contract, args } => {
                let artifact = self
                    .artifacts
                    .get(contract)
                    .map_err(|err| step_failed(step, err))?;
                let args = self.resolve_args(step, args)?;
                let deployed = deployer
                    .deploy(contract, artifact, &args, self.signer, gas_price)
                    .await
                    .map_err(|err| step_failed(step, err))?;

                self.ledger
                    .record_step(step.index, Some((contract, deployed.address)), force)?;
                Ok(StepOutcome::Deployed {
                    contract: contract.clone(),
                    address: deployed.address,
                })
            }
            StepAction::DeployProxy {
                contract,
                implementation,
            } => {
                let implementation_address = self.resolve(step, implementation)?;
                let artifact = self
                    .artifacts
                    .get(plan.artifact_name(contract))
                    .map_err(|err| step_failed(step, err))?;
                let deployed = deployer
                    .deploy_proxy(
                        contract,
                        implementation_address,
                        &artifact.abi,
                        self.signer,
                        gas_price,
                    )
                    .await
                    .map_err(|err| step_failed(step, err))?;

                self.ledger
                    .record_step(step.index, Some((contract, deployed.address)), force)?;
                Ok(StepOutcome::Deployed {
                    contract: contract.clone(),
                    address: deployed.address,
                })
            }
            StepAction::Invoke {
                target,
                method,
                args,
            } => {
                let to = self.resolve(step, target)?;
                let artifact = self
                    .artifacts
                    .get(plan.artifact_name(target))
                    .map_err(|err| step_failed(step, err))?;
                let args = self.resolve_args(step, args)?;
                let data = abi::encode_call(&artifact.abi, method, &args)
                    .map_err(|err| step_failed(step, err))?;

                let receipt = self
                    .submitter
                    .submit(TransactionCall::call(to, data, gas_price), self.signer)
                    .await
                    .map_err(|err| step_failed(step, err))?;

                self.ledger.record_step(step.index, None, force)?;
                Ok(StepOutcome::Invoked {
                    tx_hash: receipt.transaction_hash,
                })
            }
        }
    }

    fn skip_reason(&self, step: &Step) -> Option<SkipReason> {
        if self.options.force {
            return None;
        }
        match &step.action {
            StepAction::Deploy { contract, .. } | StepAction::DeployProxy { contract, .. } => {
                self.ledger.get(contract).map(SkipReason::AlreadyDeployed)
            }
            StepAction::Invoke { .. } => {
                (step.index <= self.ledger.completed_step()).then_some(SkipReason::AlreadyCompleted)
            }
        }
    }

    fn check_prerequisites(&self, step: &Step) -> Result<(), OrchestratorError> {
        for contract in &step.prerequisites {
            self.resolve(step, contract)?;
        }
        Ok(())
    }

    fn resolve(&self, step: &Step, contract: &str) -> Result<Address, OrchestratorError> {
        self.ledger.get(contract).ok_or_else(|| {
            warn!(target: "orchestrator", step = step.index, contract, "Missing prerequisite");
            OrchestratorError::MissingPrerequisite {
                step: step.index,
                name: step.name.clone(),
                contract: contract.to_string(),
            }
        })
    }

    fn resolve_args(&self, step: &Step, args: &[PlanArg]) -> Result<Vec<String>, OrchestratorError> {
        args.iter()
            .map(|arg| {
                match arg {
                    PlanArg::Contract(name) => Ok(self.resolve(step, name)?.to_string()),
                    PlanArg::Signer => Ok(self.signer.address().to_string()),
                    PlanArg::Literal(value) => Ok(value.clone()),
                }
            })
            .collect()
    }
}

fn step_banner(step: &Step, len: usize, outcome: &StepOutcome) -> String {
    let position = format!("[{}/{len}]", step.index).bold();
    match outcome {
        StepOutcome::Deployed { address, .. } => {
            format!("{position} {} {}", step.name, address.to_string().green())
        }
        StepOutcome::Invoked { tx_hash } => {
            format!("{position} {} {}", step.name, tx_hash.to_string().dimmed())
        }
        StepOutcome::Skipped(SkipReason::AlreadyDeployed(address)) => {
            format!("{position} {} {}", step.name, format!("skipped, deployed at {address}").yellow())
        }
        StepOutcome::Skipped(SkipReason::AlreadyCompleted) => {
            format!("{position} {} {}", step.name, "skipped, already done".yellow())
        }
    }
}

fn step_failed(step: &Step, source: impl Into<StepError>) -> OrchestratorError {
    OrchestratorError::StepFailed {
        step: step.index,
        name: step.name.clone(),
        source: source.into(),
    }
}

/// Cost of a run at `gas_price_wei`, in wei.
pub fn total_cost(gas_used: u64, gas_price_wei: u128) -> U256 {
    U256::from(gas_used) * U256::from(gas_price_wei)
}
