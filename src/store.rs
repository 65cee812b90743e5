//! Key-value blob store for persisted device data
//!
//! The engine persists the device-info record, the input list and the
//! per-input name/visibility overrides as JSON blobs. How they are stored is
//! up to the [`Store`] implementation.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::StoreError;

pub const DEVICE_INFO_KEY: &str = "info";
pub const INPUTS_KEY: &str = "inputs";
pub const INPUT_NAMES_KEY: &str = "input-names";
pub const INPUT_VISIBILITY_KEY: &str = "input-visibility";

pub trait Store: Send + Sync {
    /// Read a blob, `None` when it was never written
    fn read(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn write(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}

impl dyn Store {
    /// Read and deserialize a blob
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.read(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Json {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Serialize and write a blob
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        })?;
        self.write(key, &value)
    }
}

/// One pretty-printed JSON file per key
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Store for FileStore {
    fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            key: key.to_string(),
            source,
        })?;
        // An empty file is what a crashed write leaves behind
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Json {
                key: key.to_string(),
                source,
            })
    }

    fn write(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        })?;
        std::fs::write(self.path(key), json).map_err(io_err)?;
        tracing::debug!(key, "Saved blob to disk");
        Ok(())
    }
}

/// In-memory store, for embedding without persistence
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(blobs.get(key).cloned())
    }

    fn write(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.insert(key.to_string(), value.clone());
        Ok(())
    }
}
