mod cli;

use crate::cli::{
    Cli,
    Commands,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::Report,
};
use deployer_common::args::CliArgs;
use deployer_core::config::CliConfig;
use serde_json::json;
use tracing::{
    error,
    info,
};
use tracing_subscriber::{
    EnvFilter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

fn init_tracing(args: &CliArgs) {
    let default_level = if args.verbose() { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install()?;

    let cli = Cli::parse();
    init_tracing(&cli.args);

    let command = cli.command.name();
    info!(target: "deployer", command, "Running command");

    let result = async {
        let config = CliConfig::read_from_file(&cli.args)?;
        match &cli.command {
            Commands::Deploy(deploy) => {
                deploy.run(&cli.args, &config).await?;
            }
            Commands::Call(call) => {
                call.run(&cli.args, &config).await?;
            }
            Commands::Sign(sign) => {
                sign.run(&cli.args, &config).await?;
            }
        }
        Ok::<_, Report>(())
    }
    .await;

    if let Err(err) = result {
        error!(target: "deployer", command, error = %err, "Command failed");
        if cli.args.json_output() {
            eprintln!(
                "{}",
                json!({
                    "status": "error",
                    "error": {
                        "message": err.to_string(),
                    }
                })
            );
            std::process::exit(1);
        } else {
            return Err(err);
        }
    }

    info!(target: "deployer", command, "Command finished");
    Ok(())
}
