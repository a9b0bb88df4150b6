//! Settings loading and management for appshelf.
//!
//! Settings are stored in TOML format and define:
//! - The active loader mode (SteamTools lua descriptors or GreenLuma AppList)
//! - Where the Steam installation, downloads and depot key store live
//! - GreenLuma stealth options that relocate the AppList folder

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    ValidationError(String),

    #[error("Path does not exist: {0}")]
    PathNotFound(PathBuf),
}

/// Which loader the library is managed for.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    /// Lua descriptor files consumed by SteamTools.
    #[default]
    SteamTools,
    /// AppList slot files consumed by GreenLuma.
    GreenLuma,
}

impl std::fmt::Display for ToolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SteamTools => write!(f, "SteamTools"),
            Self::GreenLuma => write!(f, "GreenLuma"),
        }
    }
}

/// GreenLuma injection sub-mode.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GreenLumaMode {
    /// AppList lives in the Steam folder.
    #[default]
    Normal,
    /// AppList lives next to the DLL injector.
    StealthAnyFolder,
    /// AppList lives in the Steam folder, injection through user32.
    StealthUser32,
}

/// GreenLuma specific settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GreenLumaConfig {
    /// Injection sub-mode.
    #[serde(default)]
    pub sub_mode: GreenLumaMode,

    /// Path to `DLLInjector.exe`, required by `stealth_any_folder`.
    #[serde(default)]
    pub injector_path: Option<PathBuf>,
}

/// Complete appshelf settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Active loader mode.
    #[serde(default)]
    pub mode: ToolMode,

    /// Steam installation folder. Detected when unset.
    #[serde(default)]
    pub steam_path: Option<PathBuf>,

    /// Folder holding downloaded archives.
    #[serde(default)]
    pub downloads_path: Option<PathBuf>,

    /// Write generated app manifests into the default library.
    #[serde(default = "default_use_default_install_location")]
    pub use_default_install_location: bool,

    /// Library folder used when `use_default_install_location` is false.
    #[serde(default)]
    pub selected_library_folder: Option<PathBuf>,

    /// Depot key store file. Defaults to the data directory.
    #[serde(default)]
    pub combined_keys_path: Option<PathBuf>,

    /// Simultaneous icon lookups during enrichment.
    #[serde(default = "default_icon_concurrency")]
    pub icon_concurrency: usize,

    /// GreenLuma options.
    #[serde(default)]
    pub greenluma: GreenLumaConfig,
}

const fn default_use_default_install_location() -> bool {
    true
}

const fn default_icon_concurrency() -> usize {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: ToolMode::default(),
            steam_path: None,
            downloads_path: None,
            use_default_install_location: default_use_default_install_location(),
            selected_library_folder: None,
            combined_keys_path: None,
            icon_concurrency: default_icon_concurrency(),
            greenluma: GreenLumaConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load settings from a file, falling back to defaults when it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Load settings from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings structure (pure function).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.icon_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "icon_concurrency must be at least 1".to_string(),
            ));
        }
        if self.is_greenluma()
            && self.greenluma.sub_mode == GreenLumaMode::StealthAnyFolder
            && self.greenluma.injector_path.is_none()
        {
            return Err(ConfigError::ValidationError(
                "greenluma.sub_mode = \"stealth_any_folder\" requires greenluma.injector_path"
                    .to_string(),
            ));
        }
        if !self.use_default_install_location && self.selected_library_folder.is_none() {
            return Err(ConfigError::ValidationError(
                "use_default_install_location = false requires selected_library_folder".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether GreenLuma mode is active.
    #[must_use]
    pub fn is_greenluma(&self) -> bool {
        self.mode == ToolMode::GreenLuma
    }

    /// AppList folder override for stealth mode (pure function).
    ///
    /// Only `stealth_any_folder` relocates the AppList, to the folder holding the injector.
    #[must_use]
    pub fn custom_applist_dir(&self) -> Option<PathBuf> {
        if self.greenluma.sub_mode != GreenLumaMode::StealthAnyFolder {
            return None;
        }
        let injector_dir = self.greenluma.injector_path.as_deref()?.parent()?;
        if injector_dir.as_os_str().is_empty() {
            return None;
        }
        Some(injector_dir.join("AppList"))
    }

    /// Library folder receiving generated app manifests, `None` for the default library.
    #[must_use]
    pub fn install_library_folder(&self) -> Option<&Path> {
        if self.use_default_install_location {
            None
        } else {
            self.selected_library_folder.as_deref()
        }
    }

    /// Depot key store path, defaulting into `data_dir`.
    #[must_use]
    pub fn keys_path(&self, data_dir: &Path) -> PathBuf {
        self.combined_keys_path
            .clone()
            .unwrap_or_else(|| data_dir.join("depot_keys.toml"))
    }

    /// Resolve the Steam folder given a home directory (pure function).
    ///
    /// A configured `steam_path` always wins. Otherwise the well-known install
    /// locations are returned in probing order.
    #[must_use]
    pub fn steam_path_candidates(&self, home: Option<&Path>) -> Vec<PathBuf> {
        if let Some(path) = &self.steam_path {
            return vec![path.clone()];
        }
        let mut candidates = Vec::new();
        if cfg!(windows) {
            candidates.push(PathBuf::from(r"C:\Program Files (x86)\Steam"));
            candidates.push(PathBuf::from(r"C:\Program Files\Steam"));
        }
        if let Some(home) = home {
            candidates.push(home.join(".steam").join("steam"));
            candidates.push(home.join(".local").join("share").join("Steam"));
            candidates.push(home.join("Library").join("Application Support").join("Steam"));
        }
        candidates
    }

    /// Locate the Steam folder on this machine.
    #[must_use]
    pub fn steam_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.steam_path {
            return Some(path.clone());
        }
        let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        self.steam_path_candidates(home.as_deref())
            .into_iter()
            .find(|candidate| candidate.is_dir())
    }
}
