use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone, Default)]
pub struct CliArgs {
    #[clap(short, long, global = true)]
    pub json: bool,
    /// Log at debug level unless `RUST_LOG` says otherwise
    #[clap(short, long, global = true)]
    pub verbose: bool,
    #[clap(long, hide = true, global = true)]
    pub config_dir: Option<PathBuf>,
}

impl CliArgs {
    pub fn json_output(&self) -> bool {
        self.json
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}
