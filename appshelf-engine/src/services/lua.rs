//! Lua descriptor files in the SteamTools `stplug-in` folder.
//!
//! Each game is described by `<appid>.lua`; disabling renames it to
//! `<appid>.lua.disabled`. The files declare depots and their decryption keys:
//!
//! ```text
//! addappid(570)
//! addappid(571, 1, "2f3a...")  -- Dota 2 Content
//! setManifestid(571, "7280959080077824592", 1234567)
//! ```

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{DescriptorStore, LuaEntry, PatchOutcome, archive};
use crate::error::{LibraryError, Result};

const DISABLED_SUFFIX: &str = ".lua.disabled";

/// A depot declared by a lua file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LuaDepot {
    pub depot_id: String,
    pub key: Option<String>,
    /// Trailing `-- comment`, usually the depot name.
    pub comment: Option<String>,
    pub manifest_id: Option<String>,
    pub size_bytes: Option<u64>,
}

/// Compiled patterns for the lua statements we understand.
#[derive(Debug, Clone)]
pub struct LuaSyntax {
    addappid: Regex,
    manifest: Regex,
}

impl LuaSyntax {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            addappid: Regex::new(
                r#"(?m)^\s*addappid\(\s*(\d+)\s*(?:,\s*\d+\s*,\s*"([0-9a-fA-F]+)"\s*)?\)[ \t]*(?:--[ \t]*(.*?))?[ \t]*$"#,
            )?,
            manifest: Regex::new(
                r#"(?m)^\s*setManifestid\(\s*(\d+)\s*,\s*"(\d+)"\s*(?:,\s*(\d+)\s*)?\)"#,
            )?,
        })
    }

    /// Depot id to key pairs declared by `addappid(id, flag, "key")`.
    #[must_use]
    pub fn keys(&self, content: &str) -> BTreeMap<String, String> {
        self.addappid
            .captures_iter(content)
            .filter_map(|caps| Some((caps[1].to_string(), caps.get(2)?.as_str().to_string())))
            .collect()
    }

    /// Every declared depot in declaration order, merged with its manifest line.
    #[must_use]
    pub fn depots(&self, content: &str) -> Vec<LuaDepot> {
        let mut depots: Vec<LuaDepot> = Vec::new();
        for caps in self.addappid.captures_iter(content) {
            let depot_id = caps[1].to_string();
            if depots.iter().any(|d| d.depot_id == depot_id) {
                continue;
            }
            depots.push(LuaDepot {
                depot_id,
                key: caps.get(2).map(|m| m.as_str().to_string()),
                comment: caps
                    .get(3)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|c| !c.is_empty()),
                ..Default::default()
            });
        }

        for caps in self.manifest.captures_iter(content) {
            let depot_id = &caps[1];
            let manifest_id = caps[2].to_string();
            let size_bytes = caps.get(3).and_then(|m| m.as_str().parse().ok());
            match depots.iter_mut().find(|d| d.depot_id == depot_id) {
                Some(depot) => {
                    depot.manifest_id = Some(manifest_id);
                    depot.size_bytes = size_bytes;
                }
                None => depots.push(LuaDepot {
                    depot_id: depot_id.to_string(),
                    manifest_id: Some(manifest_id),
                    size_bytes,
                    ..Default::default()
                }),
            }
        }
        depots
    }
}

/// Comment out every active `setManifestid` line; `None` when nothing changes.
#[must_use]
pub fn patch_content(content: &str) -> Option<String> {
    let mut changed = false;
    let patched: Vec<String> = content
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("setManifestid(") {
                changed = true;
                format!("--{line}")
            } else {
                line.to_string()
            }
        })
        .collect();

    if !changed {
        return None;
    }
    let mut out = patched.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    Some(out)
}

/// Whether `name` is a descriptor file name: `<digits>.lua`.
#[must_use]
pub fn is_lua_filename(name: &str) -> bool {
    name.strip_suffix(".lua")
        .is_some_and(|stem| !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()))
}

/// The `stplug-in` folder of lua descriptors.
#[derive(Debug, Clone)]
pub struct LuaStore {
    dir: PathBuf,
    syntax: LuaSyntax,
}

impl LuaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            dir: dir.into(),
            syntax: LuaSyntax::compile()?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn enabled_path(&self, app_id: &str) -> PathBuf {
        self.dir.join(format!("{app_id}.lua"))
    }

    fn disabled_path(&self, app_id: &str) -> PathBuf {
        self.dir.join(format!("{app_id}{DISABLED_SUFFIX}"))
    }
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LibraryError::io(path, e)),
    }
}

fn timestamps(path: &Path) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let Ok(meta) = std::fs::metadata(path) else {
        return (None, None);
    };
    let created = meta.created().ok().map(DateTime::<Utc>::from);
    let modified = meta.modified().ok().map(DateTime::<Utc>::from);
    (created.or(modified), modified)
}

impl DescriptorStore for LuaStore {
    fn enumerate(&self) -> Result<Vec<LuaEntry>> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LibraryError::io(&self.dir, e)),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| LibraryError::io(&self.dir, e))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let (stem, enabled) = if let Some(stem) = name.strip_suffix(DISABLED_SUFFIX) {
                (stem, false)
            } else if let Some(stem) = name.strip_suffix(".lua") {
                (stem, true)
            } else {
                continue;
            };
            if stem.is_empty() || !stem.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let (created, modified) = timestamps(&path);
            entries.push(LuaEntry {
                app_id: stem.to_string(),
                enabled,
                created,
                modified,
                path,
            });
        }
        entries.sort_by(|a, b| a.app_id.cmp(&b.app_id));
        Ok(entries)
    }

    fn path_of(&self, app_id: &str) -> Option<PathBuf> {
        [self.enabled_path(app_id), self.disabled_path(app_id)]
            .into_iter()
            .find(|p| p.is_file())
    }

    fn read(&self, app_id: &str) -> Result<Option<String>> {
        let Some(path) = self.path_of(app_id) else {
            return Ok(None);
        };
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| LibraryError::io(&path, e))
    }

    fn patch(&self, app_id: &str) -> Result<PatchOutcome> {
        let path = self.path_of(app_id).ok_or_else(|| LibraryError::NotFound {
            app_id: app_id.to_string(),
        })?;
        let content = std::fs::read_to_string(&path).map_err(|e| LibraryError::io(&path, e))?;
        match patch_content(&content) {
            Some(patched) => {
                std::fs::write(&path, patched).map_err(|e| LibraryError::io(&path, e))?;
                info!("Patched {}", path.display());
                Ok(PatchOutcome::Patched)
            }
            None => Ok(PatchOutcome::AlreadyPatched),
        }
    }

    fn enable(&self, app_id: &str) -> Result<String> {
        let enabled = self.enabled_path(app_id);
        if enabled.is_file() {
            return Ok(format!("App {app_id} is already enabled"));
        }
        let disabled = self.disabled_path(app_id);
        if !disabled.is_file() {
            return Err(LibraryError::NotFound {
                app_id: app_id.to_string(),
            });
        }
        std::fs::rename(&disabled, &enabled).map_err(|e| LibraryError::io(&disabled, e))?;
        Ok(format!("Enabled App {app_id}"))
    }

    fn disable(&self, app_id: &str) -> Result<String> {
        let disabled = self.disabled_path(app_id);
        if disabled.is_file() {
            return Ok(format!("App {app_id} is already disabled"));
        }
        let enabled = self.enabled_path(app_id);
        if !enabled.is_file() {
            return Err(LibraryError::NotFound {
                app_id: app_id.to_string(),
            });
        }
        std::fs::rename(&enabled, &disabled).map_err(|e| LibraryError::io(&enabled, e))?;
        Ok(format!("Disabled App {app_id}"))
    }

    fn delete(&self, app_id: &str) -> Result<String> {
        let mut removed = false;
        for path in [self.enabled_path(app_id), self.disabled_path(app_id)] {
            removed |= remove_if_exists(&path)?;
        }
        if !removed {
            return Err(LibraryError::NotFound {
                app_id: app_id.to_string(),
            });
        }
        Ok(format!("Deleted lua file for App {app_id}"))
    }

    fn extract_keys(&self, app_id: &str) -> Result<BTreeMap<String, String>> {
        match self.read(app_id)? {
            Some(content) => Ok(self.syntax.keys(&content)),
            None => {
                warn!("No lua file for {} to read keys from", app_id);
                Ok(BTreeMap::new())
            }
        }
    }

    /// Copy dropped `.lua` files and the lua files inside dropped `.zip`
    /// archives into the folder, replacing existing copies.
    fn import(&self, paths: &[PathBuf]) -> Result<usize> {
        let mut files: Vec<(String, String)> = Vec::new();
        for path in paths {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            if name.ends_with(".lua") {
                if !is_lua_filename(&name) {
                    debug!("Ignoring {}: not named <appid>.lua", path.display());
                    continue;
                }
                let content =
                    std::fs::read_to_string(path).map_err(|e| LibraryError::io(path, e))?;
                files.push((name, content));
            } else if name.ends_with(".zip") {
                files.extend(archive::read_lua_files(path)?);
            }
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| LibraryError::io(&self.dir, e))?;
        let mut copied = 0;
        for (name, content) in files {
            let app_id = name.trim_end_matches(".lua");
            for stale in [self.enabled_path(app_id), self.disabled_path(app_id)] {
                remove_if_exists(&stale)?;
            }
            let dest = self.enabled_path(app_id);
            std::fs::write(&dest, content).map_err(|e| LibraryError::io(&dest, e))?;
            copied += 1;
        }
        info!("Imported {} lua file(s) into {}", copied, self.dir.display());
        Ok(copied)
    }
}
