#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod abi;
pub mod artifacts;
pub mod call_command;
pub mod config;
pub mod deploy_command;
pub mod deployer;
pub mod error;
pub mod hasher;
pub mod ledger;
pub mod orchestrator;
pub mod plan;
pub mod relay;
pub mod rpc;
pub mod sign_command;
pub mod submitter;

#[cfg(test)]
pub(crate) mod test_utils;

/// Default gas price in gwei used when neither the CLI nor the config file set one.
pub const DEFAULT_GAS_PRICE_GWEI: u64 = 1;

/// Default directory holding `json/<Name>.json` ABIs and `bin/<Name>.bin` bytecode.
pub const DEFAULT_ARTIFACTS_DIR: &str = "abi";

/// Converts a gas price in gwei to wei.
pub const fn gwei_to_wei(gwei: u64) -> u128 {
    gwei as u128 * 1_000_000_000
}
