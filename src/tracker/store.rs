//! Key-value persistence
//!
//! String keys mapped to string values, the same shape as browser local
//! storage. [`MemoryStore`] lives in-process; [`FileStore`] keeps every key
//! in one JSON object on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Result, SomnusError};

/// Minimal string key-value store
pub trait KeyValueStore {
    /// Read a value; `Ok(None)` if the key is absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any existing one
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Delete a key; absent keys are not an error
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-process store, lost on drop
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file
///
/// Every write reads the file, applies the change and rewrites it. A missing
/// file reads as an empty store. Removing a key from a file that no longer
/// parses resets the file to an empty object, since no key in it is readable.
#[derive(Debug, Clone)]
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

    fn load_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| SomnusError::FileReadError {
            path: self.path.clone(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let map = serde_json::from_str(&content)?;
        Ok(map)
    }

    fn save_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| SomnusError::DirectoryCreateError {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let content = serde_json::to_string_pretty(map)?;
        fs::write(&self.path, content).map_err(|e| SomnusError::FileWriteError {
            path: self.path.clone(),
            source: e,
        })?;

        debug!("Saved {} key(s) to {}", map.len(), self.path.display());
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load_map()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut map = self.load_map()?;
        map.insert(key.to_string(), value.to_string());
        self.save_map(&map)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut map = match self.load_map() {
            Ok(map) => map,
            Err(SomnusError::Serialization(e)) => {
                warn!(
                    "Store {} is unreadable ({}); resetting it",
                    self.path.display(),
                    e
                );
                return self.save_map(&BTreeMap::new());
            }
            Err(e) => return Err(e),
        };
        if map.remove(key).is_some() {
            self.save_map(&map)?;
        }
        Ok(())
    }
}
