//! Ordered deployment plans.
//!
//! A plan is a list of [`Step`]s numbered `1..=N`. Each step deploys a contract, deploys a
//! minimal proxy, or invokes a configuration method on a contract deployed earlier. The
//! contracts a step references are its prerequisites.

use crate::error::PlanError;

use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    path::Path,
};

/// Argument of a constructor or method call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanArg {
    /// Address of a contract recorded in the ledger
    Contract(String),
    /// Address of the operator running the plan
    Signer,
    /// Value coerced to the parameter type
    Literal(String),
}

impl PlanArg {
    pub fn contract(name: &str) -> Self {
        Self::Contract(name.to_string())
    }

    pub fn literal(value: impl ToString) -> Self {
        Self::Literal(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    Deploy {
        contract: String,
        #[serde(default)]
        args: Vec<PlanArg>,
    },
    Invoke {
        target: String,
        method: String,
        #[serde(default)]
        args: Vec<PlanArg>,
    },
    /// ERC-1167 proxy recorded as `contract`, forwarding to `implementation`
    DeployProxy {
        contract: String,
        implementation: String,
    },
}

impl StepAction {
    /// Contract name this action records in the ledger.
    pub fn produces(&self) -> Option<&str> {
        match self {
            Self::Deploy { contract, .. } | Self::DeployProxy { contract, .. } => Some(contract),
            Self::Invoke { .. } => None,
        }
    }

    /// Contract names whose addresses the action needs.
    pub fn references(&self) -> BTreeSet<String> {
        let args = match self {
            Self::Deploy { args, .. } => args.as_slice(),
            Self::Invoke { args, .. } => args.as_slice(),
            Self::DeployProxy { .. } => &[],
        };
        let mut names: BTreeSet<String> = args
            .iter()
            .filter_map(|arg| {
                match arg {
                    PlanArg::Contract(name) => Some(name.clone()),
                    PlanArg::Signer | PlanArg::Literal(_) => None,
                }
            })
            .collect();

        match self {
            Self::Invoke { target, .. } => {
                names.insert(target.clone());
            }
            Self::DeployProxy { implementation, .. } => {
                names.insert(implementation.clone());
            }
            Self::Deploy { .. } => {}
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub name: String,
    /// Contracts that must resolve in the ledger before the step runs
    #[serde(default)]
    pub prerequisites: BTreeSet<String>,
    pub action: StepAction,
}

impl Step {
    pub fn new(index: usize, name: impl Into<String>, action: StepAction) -> Self {
        Self {
            index,
            name: name.into(),
            prerequisites: action.references(),
            action,
        }
    }

    pub fn deploy(index: usize, contract: &str, args: Vec<PlanArg>) -> Self {
        Self::new(
            index,
            format!("Deploy {contract}"),
            StepAction::Deploy {
                contract: contract.to_string(),
                args,
            },
        )
    }

    pub fn invoke(index: usize, target: &str, method: &str, args: Vec<PlanArg>) -> Self {
        Self::new(
            index,
            format!("{target}.{method}"),
            StepAction::Invoke {
                target: target.to_string(),
                method: method.to_string(),
                args,
            },
        )
    }

    pub fn deploy_proxy(index: usize, contract: &str, implementation: &str) -> Self {
        Self::new(
            index,
            format!("Deploy {contract} (proxy of {implementation})"),
            StepAction::DeployProxy {
                contract: contract.to_string(),
                implementation: implementation.to_string(),
            },
        )
    }
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    steps: Vec<Step>,
}

/// A validated, ordered list of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    steps: Vec<Step>,
}

impl DeploymentPlan {
    /// Validates `steps`: indices must run `1..=N` and no step may reference a contract that
    /// only a later step produces.
    pub fn new(mut steps: Vec<Step>) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut producers = BTreeMap::new();
        for (position, step) in steps.iter_mut().enumerate() {
            let expected = position + 1;
            if step.index != expected {
                return Err(PlanError::OutOfOrder {
                    expected,
                    found: step.index,
                });
            }
            step.prerequisites.extend(step.action.references());
            if let Some(contract) = step.action.produces() {
                producers
                    .entry(contract.to_string())
                    .or_insert(step.index);
            }
        }

        for step in &steps {
            for contract in &step.prerequisites {
                if let Some(&producer) = producers.get(contract) {
                    if producer > step.index {
                        return Err(PlanError::ForwardReference {
                            step: step.index,
                            contract: contract.clone(),
                            producer,
                        });
                    }
                }
            }
        }

        Ok(Self { steps })
    }

    /// Loads a plan from a JSON document `{"steps": [...]}`.
    pub fn from_file(path: &Path) -> Result<Self, PlanError> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            PlanError::Read {
                path: path.display().to_string(),
                source,
            }
        })?;
        let file: PlanFile = serde_json::from_str(&contents).map_err(|source| {
            PlanError::Parse {
                path: path.display().to_string(),
                source,
            }
        })?;
        Self::new(file.steps)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step with the given 1-based index.
    pub fn step(&self, index: usize) -> Option<&Step> {
        index.checked_sub(1).and_then(|i| self.steps.get(i))
    }

    /// Prerequisites no step of the plan produces. The operator has to supply them.
    pub fn external_prerequisites(&self) -> BTreeSet<&str> {
        let produced: BTreeSet<&str> = self
            .steps
            .iter()
            .filter_map(|step| step.action.produces())
            .collect();
        self.steps
            .iter()
            .flat_map(|step| step.prerequisites.iter().map(String::as_str))
            .filter(|name| !produced.contains(name))
            .collect()
    }

    /// Name of the artifact whose ABI describes `contract`.
    ///
    /// Proxies are described by their implementation's ABI.
    pub fn artifact_name<'a>(&'a self, contract: &'a str) -> &'a str {
        self.steps
            .iter()
            .find_map(|step| {
                match &step.action {
                    StepAction::DeployProxy {
                        contract: proxy,
                        implementation,
                    } if proxy == contract => Some(implementation.as_str()),
                    _ => None,
                }
            })
            .unwrap_or(contract)
    }

    /// Artifacts whose ABI the plan reads from step `start` on.
    pub fn artifacts_from(&self, start: usize) -> BTreeSet<&str> {
        self.steps
            .iter()
            .filter(|step| step.index >= start)
            .map(|step| {
                match &step.action {
                    StepAction::Deploy { contract, .. } => contract.as_str(),
                    StepAction::DeployProxy { implementation, .. } => implementation.as_str(),
                    StepAction::Invoke { target, .. } => self.artifact_name(target),
                }
            })
            .collect()
    }

    /// Contracts created from step `start` on that also need creation bytecode.
    ///
    /// `will_deploy` decides whether a deploy step is going to run, so contracts a ledger already
    /// holds can be left out.
    pub fn bytecode_from(
        &self,
        start: usize,
        will_deploy: impl Fn(&str) -> bool,
    ) -> BTreeSet<&str> {
        self.steps
            .iter()
            .filter(|step| step.index >= start)
            .filter_map(|step| {
                match &step.action {
                    StepAction::Deploy { contract, .. } => Some(contract.as_str()),
                    _ => None,
                }
            })
            .filter(|contract| will_deploy(contract))
            .collect()
    }

    /// The `.crypto` registry deployment.
    ///
    /// Deploys the registry and its controllers, hands control to the controllers, then sets up
    /// the whitelisted minter and the default resolver.
    pub fn dot_crypto() -> Self {
        use PlanArg::Signer;
        let c = PlanArg::contract;

        let steps = vec![
            Step::deploy(1, "Registry", vec![]),
            Step::deploy(2, "SignatureController", vec![c("Registry")]),
            Step::invoke(3, "Registry", "addController", vec![c("SignatureController")]),
            Step::deploy(4, "MintingController", vec![c("Registry")]),
            Step::invoke(5, "Registry", "addController", vec![c("MintingController")]),
            Step::deploy(6, "URIPrefixController", vec![c("Registry")]),
            Step::invoke(7, "Registry", "addController", vec![c("URIPrefixController")]),
            Step::invoke(8, "Registry", "renounceController", vec![]),
            Step::deploy(9, "WhitelistedMinter", vec![c("MintingController")]),
            Step::invoke(10, "MintingController", "addMinter", vec![c("WhitelistedMinter")]),
            Step::invoke(11, "WhitelistedMinter", "addWhitelisted", vec![Signer]),
            Step::deploy(12, "Resolver", vec![c("Registry"), c("MintingController")]),
            Step::invoke(13, "WhitelistedMinter", "setDefaultResolver", vec![c("Resolver")]),
        ];

        Self { steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn dot_crypto_plan_is_valid() {
        let plan = DeploymentPlan::dot_crypto();
        assert_eq!(plan.len(), 13);
        assert_eq!(
            DeploymentPlan::new(plan.steps().to_vec()).unwrap(),
            plan
        );
        assert!(plan.external_prerequisites().is_empty());
    }

    #[test]
    fn dot_crypto_sets_resolver_as_default() {
        let plan = DeploymentPlan::dot_crypto();
        let last = plan.step(13).unwrap();
        assert_eq!(
            last.action,
            StepAction::Invoke {
                target: "WhitelistedMinter".to_string(),
                method: "setDefaultResolver".to_string(),
                args: vec![PlanArg::contract("Resolver")],
            }
        );
        assert!(last.prerequisites.contains("Resolver"));
        assert!(last.prerequisites.contains("WhitelistedMinter"));
    }

    #[test]
    fn prerequisites_come_from_args_and_target() {
        let step = Step::invoke(
            3,
            "Registry",
            "addController",
            vec![PlanArg::contract("SignatureController"), PlanArg::literal(1)],
        );
        let expected: BTreeSet<String> = ["Registry", "SignatureController"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(step.prerequisites, expected);
    }

    #[test]
    fn step_lookup_is_one_based() {
        let plan = DeploymentPlan::dot_crypto();
        assert_eq!(plan.step(1).unwrap().name, "Deploy Registry");
        assert!(plan.step(0).is_none());
        assert!(plan.step(14).is_none());
    }

    #[test]
    fn rejects_gaps_in_indices() {
        let err = DeploymentPlan::new(vec![
            Step::deploy(1, "Registry", vec![]),
            Step::deploy(3, "Resolver", vec![]),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            PlanError::OutOfOrder {
                expected: 2,
                found: 3
            }
        ));
    }

    #[test]
    fn rejects_empty_plan() {
        assert!(matches!(DeploymentPlan::new(vec![]), Err(PlanError::Empty)));
    }

    #[test]
    fn rejects_forward_references() {
        let err = DeploymentPlan::new(vec![
            Step::deploy(1, "Controller", vec![PlanArg::contract("Registry")]),
            Step::deploy(2, "Registry", vec![]),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            PlanError::ForwardReference {
                step: 1,
                producer: 2,
                ..
            }
        ));
    }

    #[test]
    fn unresolved_names_are_external() {
        let plan = DeploymentPlan::new(vec![Step::deploy(
            1,
            "Controller",
            vec![PlanArg::contract("Registry")],
        )])
        .unwrap();
        assert_eq!(
            plan.external_prerequisites().into_iter().collect::<Vec<_>>(),
            vec!["Registry"]
        );
    }

    #[test]
    fn proxies_use_implementation_artifact() {
        let plan = DeploymentPlan::new(vec![
            Step::deploy(1, "Resolver", vec![]),
            Step::deploy_proxy(2, "ResolverProxy", "Resolver"),
            Step::invoke(3, "ResolverProxy", "initialize", vec![]),
        ])
        .unwrap();

        assert_eq!(plan.artifact_name("ResolverProxy"), "Resolver");
        assert_eq!(plan.artifact_name("Resolver"), "Resolver");
        assert_eq!(
            plan.artifacts_from(2).into_iter().collect::<Vec<_>>(),
            vec!["Resolver"]
        );
    }

    #[test]
    fn proxy_step_needs_implementation_abi() {
        let plan = DeploymentPlan::new(vec![
            Step::deploy(1, "Resolver", vec![]),
            Step::deploy_proxy(2, "ResolverProxy", "Resolver"),
        ])
        .unwrap();

        assert_eq!(
            plan.artifacts_from(2).into_iter().collect::<Vec<_>>(),
            vec!["Resolver"]
        );
        assert!(plan.bytecode_from(2, |_| true).is_empty());
    }

    #[test]
    fn bytecode_from_leaves_out_skipped_deploys() {
        let plan = DeploymentPlan::dot_crypto();
        let all = plan.bytecode_from(1, |_| true);
        assert!(all.contains("Registry"));
        assert!(all.contains("Resolver"));

        let pending = plan.bytecode_from(1, |contract| contract == "Resolver");
        assert_eq!(pending.into_iter().collect::<Vec<_>>(), vec!["Resolver"]);
    }

    #[test]
    fn artifacts_from_skips_earlier_steps() {
        let plan = DeploymentPlan::dot_crypto();
        let needed = plan.artifacts_from(12);
        assert_eq!(
            needed.into_iter().collect::<Vec<_>>(),
            vec!["Resolver", "WhitelistedMinter"]
        );
    }

    #[test]
    fn loads_plan_from_json() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{
                "steps": [
                    { "index": 1, "name": "Deploy Registry",
                      "action": { "kind": "deploy", "contract": "Registry" } },
                    { "index": 2, "name": "Whitelist operator",
                      "action": { "kind": "invoke", "target": "Registry", "method": "addController",
                                  "args": ["signer"] } },
                    { "index": 3, "name": "Set label",
                      "action": { "kind": "invoke", "target": "Registry", "method": "setLabel",
                                  "args": [{ "literal": "crypto" }, { "contract": "Registry" }] } }
                ]
            }"#,
        )
        .unwrap();

        let plan = DeploymentPlan::from_file(file.path()).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.step(2).unwrap().prerequisites.contains("Registry"));
        match &plan.step(3).unwrap().action {
            StepAction::Invoke { args, .. } => {
                assert_eq!(
                    args,
                    &vec![PlanArg::literal("crypto"), PlanArg::contract("Registry")]
                );
            }
            other => panic!("expected invoke, got {other:?}"),
        }
    }

    #[test]
    fn malformed_plan_file_is_parse_error() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{ "steps": [ { "index": 1 } ] }"#).unwrap();
        assert!(matches!(
            DeploymentPlan::from_file(file.path()),
            Err(PlanError::Parse { .. })
        ));
    }
}
