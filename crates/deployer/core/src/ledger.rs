//! Durable record of deployed contract addresses and deployment progress.
//!
//! The ledger is the only state that survives between runs. It maps contract names to
//! addresses and keeps a cursor holding the last completed step. Every mutation is written
//! through to its [`LedgerStore`] before it becomes visible, so a crash never leaves a
//! half-applied step behind.

use crate::error::LedgerError;

use alloy::primitives::Address;
use parking_lot::Mutex;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::BTreeMap,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    },
};
use tempfile::NamedTempFile;
use tracing::debug;

type Result<T> = std::result::Result<T, LedgerError>;

/// Persisted ledger contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Last completed step, 0 before the first one
    #[serde(default)]
    pub step: usize,
    #[serde(default)]
    pub addresses: BTreeMap<String, Address>,
}

/// Where ledger state is kept.
pub trait LedgerStore: Send {
    fn load(&self) -> Result<LedgerState>;

    /// Replaces the stored state. Either the whole state is written or nothing is.
    fn store(&mut self, state: &LedgerState) -> Result<()>;
}

/// Stores the ledger as a JSON document, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn write_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Write {
            path: self.display_path(),
            source,
        }
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self) -> Result<LedgerState> {
        if !self.path.exists() {
            return Ok(LedgerState::default());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|source| {
            LedgerError::Read {
                path: self.display_path(),
                source,
            }
        })?;
        serde_json::from_str(&contents).map_err(|source| {
            LedgerError::Parse {
                path: self.display_path(),
                source,
            }
        })
    }

    fn store(&mut self, state: &LedgerState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|err| self.write_error(err))?;

        let contents = serde_json::to_vec_pretty(state)?;
        let mut file = NamedTempFile::new_in(&dir).map_err(|err| self.write_error(err))?;
        write_synced(&mut file, &contents).map_err(|err| self.write_error(err))?;
        file.persist(&self.path)
            .map_err(|err| self.write_error(err.error))?;
        sync_dir(&dir).map_err(|err| self.write_error(err))?;

        debug!(target: "ledger", path = %self.path.display(), step = state.step, "Ledger written");
        Ok(())
    }
}

fn write_synced(file: &mut NamedTempFile, contents: &[u8]) -> std::io::Result<()> {
    file.write_all(contents)?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()
}

/// Flushes the directory entry of a freshly renamed file.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Keeps the ledger in memory. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<LedgerState>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: LedgerState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            writes: Arc::default(),
        }
    }

    pub fn snapshot(&self) -> LedgerState {
        self.state.lock().clone()
    }

    /// Number of completed writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> Result<LedgerState> {
        Ok(self.snapshot())
    }

    fn store(&mut self, state: &LedgerState) -> Result<()> {
        *self.state.lock() = state.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Contract addresses by name plus the deployment cursor.
pub struct AddressLedger {
    state: LedgerState,
    store: Box<dyn LedgerStore>,
}

impl std::fmt::Debug for AddressLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressLedger")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl AddressLedger {
    pub fn open(store: impl LedgerStore + 'static) -> Result<Self> {
        let state = store.load()?;
        Ok(Self {
            state,
            store: Box::new(store),
        })
    }

    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(JsonFileStore::new(path))
    }

    pub fn in_memory() -> Self {
        Self {
            state: LedgerState::default(),
            store: Box::new(MemoryStore::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Address> {
        self.state.addresses.get(name).copied()
    }

    pub fn addresses(&self) -> &BTreeMap<String, Address> {
        &self.state.addresses
    }

    /// Last completed step, 0 when nothing ran yet.
    pub fn completed_step(&self) -> usize {
        self.state.step
    }

    /// Records `address` for `name`.
    ///
    /// Recording the address a name already has is a no-op. Replacing a different address
    /// needs `force`.
    pub fn set(&mut self, name: &str, address: Address, force: bool) -> Result<()> {
        if self.get(name) == Some(address) {
            return Ok(());
        }
        let mut next = self.state.clone();
        Self::insert(&mut next, name, address, force)?;
        self.commit(next)
    }

    /// Marks `step` completed, recording the address it produced in the same write.
    pub fn record_step(
        &mut self,
        step: usize,
        produced: Option<(&str, Address)>,
        force: bool,
    ) -> Result<()> {
        let mut next = self.state.clone();
        if let Some((name, address)) = produced {
            if self.get(name) != Some(address) {
                Self::insert(&mut next, name, address, force)?;
            }
        }
        next.step = next.step.max(step);
        self.commit(next)
    }

    /// Forgets every address and resets the cursor.
    pub fn reset(&mut self) -> Result<()> {
        self.commit(LedgerState::default())
    }

    fn insert(state: &mut LedgerState, name: &str, address: Address, force: bool) -> Result<()> {
        if let Some(existing) = state.addresses.get(name) {
            if !force {
                return Err(LedgerError::AlreadyDeployed {
                    name: name.to_string(),
                    address: *existing,
                });
            }
        }
        state.addresses.insert(name.to_string(), address);
        Ok(())
    }

    fn commit(&mut self, next: LedgerState) -> Result<()> {
        self.store.store(&next)?;
        self.state = next;
        Ok(())
    }
}
