//! Games installed through the Steam client.
//!
//! Every library root holds `steamapps/appmanifest_<appid>.acf` files; the
//! game content lives in `steamapps/common/<installdir>`.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{InstalledGame, NativePlatform};
use crate::error::{LibraryError, Result};
use crate::keyvalues;

/// Steam libraries on this machine.
#[derive(Debug, Clone)]
pub struct SteamLibrary {
    root: PathBuf,
    libraries: Vec<PathBuf>,
}

impl SteamLibrary {
    /// The Steam folder plus any extra library roots.
    pub fn new(root: &Path, extra_libraries: Vec<PathBuf>) -> Self {
        let mut libraries = vec![root.to_path_buf()];
        for library in extra_libraries {
            if !libraries.contains(&library) {
                libraries.push(library);
            }
        }
        Self {
            root: root.to_path_buf(),
            libraries,
        }
    }

    fn manifest_path(library: &Path, app_id: &str) -> PathBuf {
        library
            .join("steamapps")
            .join(format!("appmanifest_{app_id}.acf"))
    }

    fn scan_library(library: &Path) -> Vec<InstalledGame> {
        let steamapps = library.join("steamapps");
        let Ok(read_dir) = std::fs::read_dir(&steamapps) else {
            debug!("No steamapps folder in {}", library.display());
            return Vec::new();
        };

        let mut games = Vec::new();
        for entry in read_dir.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_manifest = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("appmanifest_") && n.ends_with(".acf"));
            if !is_manifest {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    if let Some(game) = parse_app_manifest(&content, library, &path) {
                        games.push(game);
                    }
                }
                Err(e) => warn!("Skipping unreadable {}: {}", path.display(), e),
            }
        }
        games
    }
}

/// Build an [`InstalledGame`] from ACF text; `None` when `appid` is missing.
fn parse_app_manifest(content: &str, library: &Path, manifest_path: &Path) -> Option<InstalledGame> {
    let pairs = keyvalues::parse_flat(content);
    let app_id = pairs.get("appid")?.clone();
    let install_dir = pairs
        .get("installdir")
        .filter(|dir| !dir.is_empty())
        .map(|dir| library.join("steamapps").join("common").join(dir));
    let last_updated = pairs
        .get("lastupdated")
        .and_then(|ts| ts.parse::<i64>().ok())
        .filter(|ts| *ts > 0)
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));

    Some(InstalledGame {
        name: pairs.get("name").cloned().unwrap_or_default(),
        size_bytes: pairs
            .get("sizeondisk")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        library_path: library.to_path_buf(),
        install_dir,
        last_updated,
        manifest_path: manifest_path.to_path_buf(),
        app_id,
    })
}

impl NativePlatform for SteamLibrary {
    fn list_installed(&self) -> Result<Vec<InstalledGame>> {
        let mut games: Vec<InstalledGame> = Vec::new();
        for library in &self.libraries {
            for game in Self::scan_library(library) {
                if !games.iter().any(|g| g.app_id == game.app_id) {
                    games.push(game);
                }
            }
        }
        games.sort_by(|a, b| a.app_id.cmp(&b.app_id));
        Ok(games)
    }

    fn uninstall(&self, app_id: &str) -> Result<()> {
        let game = self
            .list_installed()?
            .into_iter()
            .find(|g| g.app_id == app_id)
            .ok_or_else(|| LibraryError::NotFound {
                app_id: app_id.to_string(),
            })?;

        if let Some(dir) = &game.install_dir {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => info!("Removed {}", dir.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(LibraryError::io(dir, e)),
            }
        }
        std::fs::remove_file(&game.manifest_path)
            .map_err(|e| LibraryError::io(&game.manifest_path, e))?;
        info!("Uninstalled Steam game {} ({})", game.name, app_id);
        Ok(())
    }

    fn local_icon(&self, app_id: &str) -> Option<PathBuf> {
        let cache = self.root.join("appcache").join("librarycache");
        [
            cache.join(format!("{app_id}_icon.jpg")),
            cache.join(app_id).join("icon.jpg"),
            cache.join(format!("{app_id}_header.jpg")),
        ]
        .into_iter()
        .find(|p| p.is_file())
    }

    fn write_app_manifest(
        &self,
        app_id: &str,
        name: &str,
        library: Option<&Path>,
    ) -> Result<PathBuf> {
        let library = library.unwrap_or(&self.root);
        let path = Self::manifest_path(library, app_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LibraryError::io(parent, e))?;
        }

        let content = keyvalues::write_flat(
            "AppState",
            &[
                ("appid", app_id.to_string()),
                ("Universe", "1".to_string()),
                ("name", name.to_string()),
                ("StateFlags", "4".to_string()),
                ("installdir", app_id.to_string()),
                ("LastUpdated", Utc::now().timestamp().to_string()),
                ("SizeOnDisk", "0".to_string()),
                ("buildid", "0".to_string()),
                ("AutoUpdateBehavior", "0".to_string()),
                ("AllowOtherDownloadsWhileRunning", "0".to_string()),
            ],
        );
        std::fs::write(&path, content).map_err(|e| LibraryError::io(&path, e))?;
        info!("Generated {}", path.display());
        Ok(path)
    }

    fn remove_app_manifest(&self, app_id: &str) -> Result<bool> {
        let mut removed = false;
        for library in &self.libraries {
            let path = Self::manifest_path(library, app_id);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    removed = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(LibraryError::io(&path, e)),
            }
        }
        Ok(removed)
    }
}
