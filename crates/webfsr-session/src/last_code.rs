//! Last-known pairing code.
//!
//! The code of the most recent successful connection is kept in a small
//! key/value settings store so a remote can offer "reconnect to last
//! device". Storage is best effort: the in-memory value always updates and
//! storage failures are only logged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};
use webfsr_types::PairingCode;

/// Settings key holding the last code.
pub const LAST_CODE_KEY: &str = "lastCode";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is malformed: {0}")]
    Malformed(String),

    #[error("settings store unavailable")]
    Unavailable,
}

/// Minimal string key/value store.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Settings kept as a flat TOML table in one file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| StoreError::Malformed(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string(values).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

/// Shared in-memory store. Clones see the same values.
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

/// The last-known code, cached in memory over an optional backing store.
pub struct LastCodeStore {
    backend: Option<Box<dyn KeyValueStore>>,
    cached: Mutex<Option<PairingCode>>,
}

impl LastCodeStore {
    /// Load the stored code from `backend`. A failing backend leaves the
    /// store empty but still usable.
    pub fn open(backend: impl KeyValueStore) -> Self {
        let cached = match backend.get(LAST_CODE_KEY) {
            Ok(Some(raw)) => match PairingCode::parse(&raw) {
                Ok(code) => Some(code),
                Err(e) => {
                    warn!(value = %raw, error = %e, "ignoring invalid stored pairing code");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "failed to load last pairing code");
                None
            }
        };
        Self {
            backend: Some(Box::new(backend)),
            cached: Mutex::new(cached),
        }
    }

    /// A store that only lives as long as the process.
    pub fn in_memory() -> Self {
        Self {
            backend: None,
            cached: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<PairingCode> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Upsert (`Some`) or delete (`None`) the stored code.
    pub fn set(&self, code: Option<PairingCode>) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = code.clone();

        let Some(backend) = &self.backend else {
            warn!("settings store not initialised, last pairing code will not persist");
            return;
        };
        let result = match &code {
            Some(code) => backend.put(LAST_CODE_KEY, code.as_str()),
            None => backend.delete(LAST_CODE_KEY),
        };
        match result {
            Ok(()) => debug!(code = ?code.as_ref().map(PairingCode::as_str), "saved last pairing code"),
            Err(e) => warn!(error = %e, "failed to save last pairing code"),
        }
    }

    pub fn clear(&self) {
        self.set(None);
    }
}
