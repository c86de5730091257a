//! Compiled contract artifacts.
//!
//! An artifacts directory holds `json/<Name>.json` (the ABI) and `bin/<Name>.bin` (hex creation
//! bytecode, with or without `0x`).

use crate::error::ArtifactError;

use alloy::primitives::Bytes;
use alloy_json_abi::JsonAbi;
use std::{
    collections::HashMap,
    path::{
        Path,
        PathBuf,
    },
};

type Result<T> = std::result::Result<T, ArtifactError>;

#[derive(Debug, Clone, PartialEq)]
pub struct ContractArtifact {
    pub abi: JsonAbi,
    /// `None` when only the interface was loaded.
    pub bytecode: Option<Bytes>,
}

impl ContractArtifact {
    pub fn new(abi: JsonAbi, bytecode: Bytes) -> Self {
        Self {
            abi,
            bytecode: Some(bytecode),
        }
    }

    pub fn interface(abi: JsonAbi) -> Self {
        Self {
            abi,
            bytecode: None,
        }
    }
}

/// Artifacts by contract name.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    contracts: HashMap<String, ContractArtifact>,
}

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, artifact: ContractArtifact) {
        self.contracts.insert(name.into(), artifact);
    }

    pub fn get(&self, name: &str) -> Result<&ContractArtifact> {
        self.contracts
            .get(name)
            .ok_or_else(|| ArtifactError::Missing(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    /// Loads the ABI of each contract in `interfaces` and the ABI and bytecode of each contract
    /// in `deployables` from `dir`.
    pub fn load_dir<'a>(
        dir: &Path,
        interfaces: impl IntoIterator<Item = &'a str>,
        deployables: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let mut artifacts = Self::new();
        for name in deployables {
            if artifacts.contains(name) {
                continue;
            }
            let abi = load_abi(dir, name)?;
            let bytecode = load_bytecode(dir, name)?;
            artifacts.insert(name, ContractArtifact::new(abi, bytecode));
        }
        for name in interfaces {
            if artifacts.contains(name) {
                continue;
            }
            artifacts.insert(name, ContractArtifact::interface(load_abi(dir, name)?));
        }
        Ok(artifacts)
    }
}

pub fn abi_path(dir: &Path, name: &str) -> PathBuf {
    dir.join("json").join(format!("{name}.json"))
}

pub fn bytecode_path(dir: &Path, name: &str) -> PathBuf {
    dir.join("bin").join(format!("{name}.bin"))
}

/// Reads `json/<name>.json` under `dir`.
pub fn load_abi(dir: &Path, name: &str) -> Result<JsonAbi> {
    let path = abi_path(dir, name);
    let contents = read(&path)?;
    serde_json::from_str(&contents).map_err(|source| {
        ArtifactError::ParseAbi {
            path: path.display().to_string(),
            source,
        }
    })
}

/// Reads `bin/<name>.bin` under `dir`.
pub fn load_bytecode(dir: &Path, name: &str) -> Result<Bytes> {
    let path = bytecode_path(dir, name);
    let contents = read(&path)?;
    let trimmed = contents.trim();
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    alloy::hex::decode(hex).map(Bytes::from).map_err(|source| {
        ArtifactError::Bytecode {
            path: path.display().to_string(),
            source,
        }
    })
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| {
        ArtifactError::Read {
            path: path.display().to_string(),
            source,
        }
    })
}
