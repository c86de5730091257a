use clap::Parser;
use deployer_common::args::CliArgs;
use deployer_core::{
    call_command::CallArgs,
    deploy_command::DeployArgs,
    sign_command::SignArgs,
};

#[derive(Parser)]
#[command(
    name = "deployer",
    version,
    about = "Deploys and drives the .crypto registry contracts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    #[command(flatten)]
    pub args: CliArgs,
}

#[derive(clap::Subcommand)]
#[allow(clippy::large_enum_variant)]
pub enum Commands {
    #[command(name = "deploy")]
    Deploy(DeployArgs),
    #[command(name = "call")]
    Call(CallArgs),
    #[command(name = "sign")]
    Sign(SignArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deploy(_) => "deploy",
            Self::Call(_) => "call",
            Self::Sign(_) => "sign",
        }
    }
}
