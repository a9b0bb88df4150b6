//! Error types for library operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while managing the library.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The AppList cannot hold the requested slots.
    #[error(
        "AppList is full ({current}/{capacity}): {requested} slot(s) requested, {remaining} remaining"
    )]
    CapacityExceeded {
        current: usize,
        capacity: usize,
        requested: usize,
        remaining: usize,
    },

    /// The app is already registered in the AppList.
    #[error("App ID {app_id} already exists in the AppList")]
    DuplicateIdentifier { app_id: String },

    /// The app is not known to the Steam app list.
    #[error("App ID {app_id} not found in Steam's app list")]
    UnknownIdentifier { app_id: String },

    /// Another install is in progress.
    #[error("Another installation is in progress")]
    Busy,

    /// File system operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Archive could not be read or extracted.
    #[error("Failed to extract archive at {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// Remote request failed.
    #[error("Request to {url} failed: {source}")]
    Remote { url: String, source: reqwest::Error },

    /// JSON could not be parsed or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML could not be parsed.
    #[error("Failed to parse TOML at {}: {source}", path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// TOML could not be written.
    #[error("Failed to serialize TOML at {}: {source}", path.display())]
    TomlSerialize {
        path: PathBuf,
        source: toml::ser::Error,
    },

    /// Settings are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A lua pattern failed to compile.
    #[error("Invalid lua pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// No file or record exists for the app.
    #[error("Nothing installed for App ID {app_id}")]
    NotFound { app_id: String },

    /// The Steam folder could not be located.
    #[error("Steam installation not found; set steam_path in the settings")]
    SteamPathMissing,

    /// An interactive prompt failed.
    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    /// XDG directories could not be determined.
    #[error("XDG directory error: {message}")]
    XdgDirectories { message: String },

    /// Some uninstall steps failed; the others were still attempted.
    #[error("Uninstall of {app_id} incomplete: {}", failures.join("; "))]
    PartialUninstall {
        app_id: String,
        failures: Vec<String>,
    },
}

impl LibraryError {
    /// Wrap an I/O error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error was raised before anything touched the disk.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. }
                | Self::DuplicateIdentifier { .. }
                | Self::UnknownIdentifier { .. }
                | Self::Busy
        )
    }
}

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, LibraryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LibraryError::CapacityExceeded {
            current: 126,
            capacity: 128,
            requested: 3,
            remaining: 2,
        };
        assert_eq!(
            err.to_string(),
            "AppList is full (126/128): 3 slot(s) requested, 2 remaining"
        );

        let err = LibraryError::DuplicateIdentifier {
            app_id: "570".to_string(),
        };
        assert_eq!(err.to_string(), "App ID 570 already exists in the AppList");

        let err = LibraryError::PartialUninstall {
            app_id: "570".to_string(),
            failures: vec!["slot".to_string(), "keys".to_string()],
        };
        assert_eq!(err.to_string(), "Uninstall of 570 incomplete: slot; keys");
    }

    #[test]
    fn test_error_from_config() {
        let err: LibraryError = ConfigError::ValidationError("bad".to_string()).into();
        assert!(matches!(err, LibraryError::Config(_)));
    }

    #[test]
    fn test_error_from_json() {
        if let Err(json_err) = serde_json::from_str::<serde_json::Value>("invalid json {{{") {
            let err: LibraryError = json_err.into();
            assert!(matches!(err, LibraryError::Json(_)));
        } else {
            panic!("Should fail to parse invalid JSON");
        }
    }

    #[test]
    fn test_validation_classification() {
        assert!(LibraryError::Busy.is_validation());
        assert!(
            LibraryError::UnknownIdentifier {
                app_id: "1".to_string()
            }
            .is_validation()
        );
        assert!(!LibraryError::SteamPathMissing.is_validation());
    }
}
