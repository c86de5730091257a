//! CLI configuration: the optional `config.toml` plus the network flags shared by every
//! command.

use crate::{
    DEFAULT_ARTIFACTS_DIR,
    DEFAULT_GAS_PRICE_GWEI,
    error::{
        CommandError,
        ConfigError,
    },
    gwei_to_wei,
    rpc::HttpRpcClient,
    submitter::TransactionSubmitter,
};

use alloy::{
    primitives::B256,
    signers::local::PrivateKeySigner,
};
use clap::ValueHint;
use deployer_common::args::CliArgs;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
    time::Duration,
};
use tracing::debug;

pub const CONFIG_DIR: &str = ".deployer";
pub const CONFIG_FILE: &str = "config.toml";
pub const LEDGER_FILE: &str = "ledger.json";

/// Defaults read from `<config-dir>/config.toml`. Flags and environment variables win.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub rpc_url: Option<String>,
    /// Hex private key or path to a file holding one
    pub private_key: Option<String>,
    pub gas_price_gwei: Option<u64>,
    pub chain_id: Option<u64>,
    pub artifacts_dir: Option<PathBuf>,
}

impl std::fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliConfig")
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("gas_price_gwei", &self.gas_price_gwei)
            .field("chain_id", &self.chain_id)
            .field("artifacts_dir", &self.artifacts_dir)
            .finish()
    }
}

impl CliConfig {
    /// `--config-dir` if given, `~/.deployer` otherwise.
    pub fn config_dir(args: &CliArgs) -> Result<PathBuf, ConfigError> {
        match &args.config_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                dirs::home_dir()
                    .map(|home| home.join(CONFIG_DIR))
                    .ok_or(ConfigError::HomeDirNotFound)
            }
        }
    }

    /// Reads the config file, returning the defaults when it does not exist.
    pub fn read_from_file(args: &CliArgs) -> Result<Self, ConfigError> {
        Self::read_from_path(&Self::config_dir(args)?.join(CONFIG_FILE))
    }

    pub fn read_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(target: "config", path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::Read {
                path: path.display().to_string(),
                source,
            }
        })?;
        toml::from_str(&contents).map_err(|source| {
            ConfigError::Parse {
                path: path.display().to_string(),
                source,
            }
        })
    }

    /// Default ledger location, `<config-dir>/ledger.json`.
    pub fn ledger_path(args: &CliArgs) -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir(args)?.join(LEDGER_FILE))
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.artifacts_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR))
    }
}

/// Node and signing flags shared by `deploy`, `call` and `sign`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct NetworkArgs {
    /// JSON-RPC endpoint of the node
    #[clap(
        long = "url",
        short = 'u',
        env = "DEPLOYER_RPC_URL",
        value_hint = ValueHint::Url,
        value_name = "URL"
    )]
    pub rpc_url: Option<String>,

    /// Hex private key, or a path to a file holding one
    #[clap(
        long,
        env = "DEPLOYER_PRIVATE_KEY",
        hide_env_values = true,
        value_name = "KEY"
    )]
    pub private_key: Option<String>,

    /// Gas price in gwei
    #[clap(long = "gas-price", env = "DEPLOYER_GAS_PRICE_GWEI", value_name = "GWEI")]
    pub gas_price_gwei: Option<u64>,

    /// Delay between receipt polls
    #[clap(
        long = "poll-interval-ms",
        env = "DEPLOYER_POLL_INTERVAL_MS",
        default_value_t = 1000,
        value_name = "MS"
    )]
    pub poll_interval_ms: u64,

    /// Chain id for replay protection. Read from the node when not set.
    #[clap(long)]
    pub chain_id: Option<u64>,
}

impl NetworkArgs {
    pub fn rpc_url<'a>(&'a self, config: &'a CliConfig) -> Result<&'a str, ConfigError> {
        self.rpc_url
            .as_deref()
            .or(config.rpc_url.as_deref())
            .ok_or(ConfigError::MissingRpcUrl)
    }

    pub fn gas_price_gwei(&self, config: &CliConfig) -> u64 {
        self.gas_price_gwei
            .or(config.gas_price_gwei)
            .unwrap_or(DEFAULT_GAS_PRICE_GWEI)
    }

    pub fn gas_price_wei(&self, config: &CliConfig) -> u128 {
        gwei_to_wei(self.gas_price_gwei(config))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn signer(&self, config: &CliConfig) -> Result<PrivateKeySigner, ConfigError> {
        let key = self
            .private_key
            .as_deref()
            .or(config.private_key.as_deref())
            .ok_or(ConfigError::MissingPrivateKey)?;
        load_signer(key)
    }

    /// Connects to the node and builds a submitter for it.
    pub fn submitter(&self, config: &CliConfig) -> Result<TransactionSubmitter, CommandError> {
        let node = HttpRpcClient::new(self.rpc_url(config)?)?;
        let submitter =
            TransactionSubmitter::new(Arc::new(node)).with_poll_interval(self.poll_interval());
        Ok(match self.chain_id.or(config.chain_id) {
            Some(chain_id) => submitter.with_chain_id(chain_id),
            None => submitter,
        })
    }
}

/// Parses a private key given as 64 hex digits (optionally `0x` prefixed) or as the path of
/// a file containing one.
pub fn load_signer(value: &str) -> Result<PrivateKeySigner, ConfigError> {
    if let Some(signer) = parse_hex_key(value) {
        return Ok(signer);
    }

    let path = Path::new(value.trim());
    if path.is_file() {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::Read {
                path: path.display().to_string(),
                source,
            }
        })?;
        return parse_hex_key(&contents).ok_or(ConfigError::BadPrivateKey);
    }

    Err(ConfigError::BadPrivateKey)
}

fn parse_hex_key(value: &str) -> Option<PrivateKeySigner> {
    let trimmed = value.trim();
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let bytes: B256 = hex.parse().ok()?;
    PrivateKeySigner::from_bytes(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn args_in(dir: &Path) -> CliArgs {
        CliArgs {
            config_dir: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_config_is_default() {
        let dir = TempDir::new().unwrap();
        let config = CliConfig::read_from_file(&args_in(dir.path())).unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.artifacts_dir(), PathBuf::from(DEFAULT_ARTIFACTS_DIR));
    }

    #[test]
    fn test_reads_toml_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "rpc_url = \"http://localhost:8545\"\ngas_price_gwei = 20\nartifacts_dir = \"build\"\n",
        )
        .unwrap();

        let config = CliConfig::read_from_file(&args_in(dir.path())).unwrap();
        assert_eq!(config.rpc_url.as_deref(), Some("http://localhost:8545"));
        assert_eq!(config.gas_price_gwei, Some(20));
        assert_eq!(config.artifacts_dir(), PathBuf::from("build"));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "gas_price_gwei = \"lots\"").unwrap();
        assert!(matches!(
            CliConfig::read_from_file(&args_in(dir.path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_ledger_lives_in_config_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            CliConfig::ledger_path(&args_in(dir.path())).unwrap(),
            dir.path().join(LEDGER_FILE)
        );
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let config = CliConfig {
            private_key: Some(KEY.to_string()),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains(KEY));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_flags_override_config() {
        let config = CliConfig {
            rpc_url: Some("http://config:8545".to_string()),
            gas_price_gwei: Some(5),
            ..Default::default()
        };
        let args = NetworkArgs {
            rpc_url: Some("http://flag:8545".to_string()),
            ..Default::default()
        };

        assert_eq!(args.rpc_url(&config).unwrap(), "http://flag:8545");
        assert_eq!(args.gas_price_wei(&config), 5_000_000_000);
        assert_eq!(
            NetworkArgs::default().gas_price_gwei(&CliConfig::default()),
            DEFAULT_GAS_PRICE_GWEI
        );
    }

    #[test]
    fn test_missing_rpc_url_and_key() {
        let args = NetworkArgs::default();
        let config = CliConfig::default();
        assert!(matches!(args.rpc_url(&config), Err(ConfigError::MissingRpcUrl)));
        assert!(matches!(args.signer(&config), Err(ConfigError::MissingPrivateKey)));
    }

    #[test]
    fn test_load_signer_from_hex() {
        let plain = load_signer(KEY).unwrap();
        let prefixed = load_signer(&format!("0x{KEY}")).unwrap();
        assert_eq!(plain.address(), prefixed.address());
        assert_eq!(
            plain.address().to_string(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_load_signer_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, format!("0x{KEY}\n")).unwrap();

        let signer = load_signer(path.to_str().unwrap()).unwrap();
        assert_eq!(signer.address(), load_signer(KEY).unwrap().address());
    }

    #[test]
    fn test_bad_private_key() {
        assert!(matches!(load_signer("0x1234"), Err(ConfigError::BadPrivateKey)));
        assert!(matches!(
            load_signer("/definitely/not/a/key/file"),
            Err(ConfigError::BadPrivateKey)
        ));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "not a key").unwrap();
        assert!(matches!(
            load_signer(path.to_str().unwrap()),
            Err(ConfigError::BadPrivateKey)
        ));
    }

    #[test]
    fn test_network_args_parse_from_flags() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            network: NetworkArgs,
        }

        let wrapper = Wrapper::try_parse_from([
            "deployer",
            "--url",
            "http://localhost:8545",
            "--gas-price",
            "3",
            "--poll-interval-ms",
            "250",
            "--chain-id",
            "1337",
        ])
        .unwrap();
        assert_eq!(wrapper.network.rpc_url.as_deref(), Some("http://localhost:8545"));
        assert_eq!(wrapper.network.gas_price_gwei, Some(3));
        assert_eq!(wrapper.network.poll_interval(), Duration::from_millis(250));
        assert_eq!(wrapper.network.chain_id, Some(1337));
    }
}
