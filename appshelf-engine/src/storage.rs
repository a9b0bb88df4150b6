//! XDG-compliant storage for appshelf state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{LibraryError, Result};

/// Manages XDG-compliant storage for appshelf.
///
/// Uses the following directories:
/// - Config: `~/.config/appshelf/appshelf.toml`
/// - Cache: `~/.cache/appshelf/` (icons, cached manifests, app list)
/// - Data: `~/.local/share/appshelf/` (install ledger, depot keys)
#[derive(Debug, Clone)]
pub struct ShelfStorage {
    config_dir: PathBuf,
    cache_dir: PathBuf,
    data_dir: PathBuf,
}

/// A GreenLuma install recorded by the install workflow.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct InstalledApp {
    pub app_id: String,
    pub name: String,
    /// Depot ids registered in the AppList together with the app.
    #[serde(default)]
    pub depots: Vec<String>,
    pub installed_at: DateTime<Utc>,
    /// Generated `appmanifest_<id>.acf`, if one was written.
    #[serde(default)]
    pub app_manifest: Option<PathBuf>,
}

impl InstalledApp {
    /// Every AppList identifier owned by this install, main app first.
    #[must_use]
    pub fn slot_ids(&self) -> Vec<String> {
        std::iter::once(self.app_id.clone())
            .chain(self.depots.iter().cloned())
            .collect()
    }
}

/// Ledger of installs performed through appshelf.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct InstallLedger {
    #[serde(default)]
    pub apps: BTreeMap<String, InstalledApp>,
}

impl InstallLedger {
    /// Find the install whose depots include `depot_id`.
    #[must_use]
    pub fn owner_of_depot(&self, depot_id: &str) -> Option<&InstalledApp> {
        self.apps
            .values()
            .find(|app| app.depots.iter().any(|d| d == depot_id))
    }
}

impl ShelfStorage {
    /// Create a new storage handle, initializing directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - XDG directories cannot be determined
    /// - Directory creation fails
    pub fn new() -> Result<Self> {
        let proj_dirs = directories::ProjectDirs::from("", "", "appshelf").ok_or_else(|| {
            LibraryError::XdgDirectories {
                message: "Could not determine XDG directories".to_string(),
            }
        })?;

        Self::at(
            proj_dirs.config_dir().to_path_buf(),
            proj_dirs.cache_dir().to_path_buf(),
            proj_dirs.data_dir().to_path_buf(),
        )
    }

    /// Create a storage handle rooted at explicit directories.
    pub fn at(config_dir: PathBuf, cache_dir: PathBuf, data_dir: PathBuf) -> Result<Self> {
        for dir in [&config_dir, &cache_dir, &data_dir] {
            std::fs::create_dir_all(dir).map_err(|e| LibraryError::io(dir, e))?;
        }
        Ok(Self {
            config_dir,
            cache_dir,
            data_dir,
        })
    }

    /// Get the config directory path.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get the cache directory path.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the settings file in the config directory.
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join("appshelf.toml")
    }

    fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(".installed.toml")
    }

    /// Load the install ledger.
    ///
    /// If the ledger doesn't exist, returns an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger exists but cannot be read or parsed.
    pub fn load_ledger(&self) -> Result<InstallLedger> {
        let path = self.ledger_path();
        if !path.exists() {
            return Ok(InstallLedger::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| LibraryError::io(&path, e))?;
        toml::from_str(&content).map_err(|source| LibraryError::TomlParse { path, source })
    }

    /// Save the install ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn save_ledger(&self, ledger: &InstallLedger) -> Result<()> {
        let path = self.ledger_path();
        let content = toml::to_string_pretty(ledger).map_err(|source| {
            LibraryError::TomlSerialize {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&path, content).map_err(|e| LibraryError::io(&path, e))
    }

    /// Insert or replace one ledger record.
    pub fn record_install(&self, app: InstalledApp) -> Result<()> {
        let mut ledger = self.load_ledger()?;
        ledger.apps.insert(app.app_id.clone(), app);
        self.save_ledger(&ledger)
    }

    /// Remove one ledger record, returning it if present.
    pub fn forget_install(&self, app_id: &str) -> Result<Option<InstalledApp>> {
        let mut ledger = self.load_ledger()?;
        let removed = ledger.apps.remove(app_id);
        if removed.is_some() {
            self.save_ledger(&ledger)?;
        }
        Ok(removed)
    }

    /// Cached icon directory.
    pub fn icons_dir(&self) -> PathBuf {
        self.cache_dir.join("icons")
    }

    /// Cached manifest metadata directory.
    pub fn manifests_dir(&self) -> PathBuf {
        self.cache_dir.join("manifests")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_temp_storage() -> (TempDir, ShelfStorage) {
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(e) => panic!("Failed to create temp dir: {e}"),
        };
        let storage = match ShelfStorage::at(
            temp_dir.path().join("config"),
            temp_dir.path().join("cache"),
            temp_dir.path().join("data"),
        ) {
            Ok(storage) => storage,
            Err(e) => panic!("Failed to create storage: {e}"),
        };
        (temp_dir, storage)
    }

    fn sample_app(app_id: &str, depots: &[&str]) -> InstalledApp {
        InstalledApp {
            app_id: app_id.to_string(),
            name: format!("Game {app_id}"),
            depots: depots.iter().map(|d| d.to_string()).collect(),
            installed_at: Utc::now(),
            app_manifest: None,
        }
    }

    #[test]
    fn test_directories_created() {
        let (_temp, storage) = create_temp_storage();
        assert!(storage.config_dir().exists());
        assert!(storage.cache_dir().exists());
        assert!(storage.data_dir().exists());
        assert_eq!(
            storage.settings_path(),
            storage.config_dir().join("appshelf.toml")
        );
    }

    #[test]
    fn test_load_empty_ledger() {
        let (_temp, storage) = create_temp_storage();

        if let Ok(ledger) = storage.load_ledger() {
            assert_eq!(ledger, InstallLedger::default());
        } else {
            panic!("Should load ledger");
        }
    }

    #[test]
    fn test_record_and_forget_install() -> Result<()> {
        let (_temp, storage) = create_temp_storage();

        storage.record_install(sample_app("570", &["571", "572"]))?;
        let ledger = storage.load_ledger()?;
        assert_eq!(ledger.apps.len(), 1);
        assert_eq!(
            ledger.apps["570"].slot_ids(),
            vec!["570".to_string(), "571".to_string(), "572".to_string()]
        );
        assert_eq!(
            ledger.owner_of_depot("572").map(|a| a.app_id.as_str()),
            Some("570")
        );

        let removed = storage.forget_install("570")?;
        assert!(removed.is_some());
        assert!(storage.load_ledger()?.apps.is_empty());
        assert!(storage.forget_install("570")?.is_none());
        Ok(())
    }

    #[test]
    fn test_corrupt_ledger_reports_path() -> Result<()> {
        let (_temp, storage) = create_temp_storage();
        std::fs::write(storage.ledger_path(), "not [[ toml")
            .map_err(|e| LibraryError::io(storage.ledger_path(), e))?;

        let Err(err) = storage.load_ledger() else {
            panic!("expected corrupt ledger to fail");
        };
        assert!(matches!(err, LibraryError::TomlParse { .. }));
        Ok(())
    }
}
