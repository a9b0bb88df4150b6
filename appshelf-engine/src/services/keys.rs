//! Combined depot key store.
//!
//! ```toml
//! [keys]
//! 571 = "2f3a..."
//! 572 = "90be..."
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use super::KeyedConfigStore;
use crate::error::{LibraryError, Result};

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct KeyFile {
    #[serde(default)]
    keys: BTreeMap<String, String>,
}

/// TOML file of depot decryption keys.
#[derive(Debug)]
pub struct KeyStore {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored key.
    pub fn load(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.read_file()?.keys)
    }

    fn read_file(&self) -> Result<KeyFile> {
        if !self.path.exists() {
            return Ok(KeyFile::default());
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| LibraryError::io(&self.path, e))?;
        toml::from_str(&content).map_err(|source| LibraryError::TomlParse {
            path: self.path.clone(),
            source,
        })
    }

    fn write_file(&self, file: &KeyFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LibraryError::io(parent, e))?;
        }
        let content =
            toml::to_string_pretty(file).map_err(|source| LibraryError::TomlSerialize {
                path: self.path.clone(),
                source,
            })?;
        std::fs::write(&self.path, content).map_err(|e| LibraryError::io(&self.path, e))
    }

    fn update<F: FnOnce(&mut KeyFile) -> usize>(&self, change: F) -> Result<usize> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = self.read_file()?;
        let changed = change(&mut file);
        if changed > 0 {
            self.write_file(&file)?;
        }
        Ok(changed)
    }
}

impl KeyedConfigStore for KeyStore {
    fn merge(&self, keys: &BTreeMap<String, String>) -> Result<usize> {
        let written = self.update(|file| {
            let mut written = 0;
            for (depot, key) in keys {
                if file.keys.get(depot) != Some(key) {
                    file.keys.insert(depot.clone(), key.clone());
                    written += 1;
                }
            }
            written
        })?;
        info!(
            "Merged {} depot key(s) into {}",
            written,
            self.path.display()
        );
        Ok(written)
    }

    fn remove(&self, ids: &[String]) -> Result<usize> {
        let removed = self.update(|file| {
            ids.iter()
                .filter(|id| file.keys.remove(id.as_str()).is_some())
                .count()
        })?;
        debug!(
            "Removed {} depot key(s) from {}",
            removed,
            self.path.display()
        );
        Ok(removed)
    }
}
