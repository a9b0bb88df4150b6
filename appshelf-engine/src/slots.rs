//! GreenLuma AppList slot registry.
//!
//! The AppList is a folder of numbered text files (`0.txt`, `1.txt`, ...),
//! each holding one app or depot id. GreenLuma reads at most
//! [`APPLIST_CAPACITY`] of them, so every reservation is checked against that
//! cap before anything is written.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{LibraryError, Result};

/// Number of AppList files GreenLuma accepts.
pub const APPLIST_CAPACITY: usize = 128;

/// One registered slot file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotEntry {
    /// Numeric file stem, `None` for files that are not named `<n>.txt`.
    pub index: Option<usize>,
    pub app_id: String,
    pub path: PathBuf,
    pub modified: Option<DateTime<Utc>>,
}

/// Handle on one AppList folder.
#[derive(Debug, Clone)]
pub struct AppList {
    dir: PathBuf,
    capacity: usize,
}

impl AppList {
    /// AppList at `dir` with the GreenLuma capacity.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_capacity(dir, APPLIST_CAPACITY)
    }

    /// AppList at `dir` with an explicit capacity.
    pub fn with_capacity(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity,
        }
    }

    /// Resolve the AppList folder: the stealth override when configured, else `<steam>/AppList`.
    pub fn resolve(steam_path: &Path, custom_dir: Option<PathBuf>) -> Self {
        Self::new(custom_dir.unwrap_or_else(|| steam_path.join("AppList")))
    }

    /// The folder holding the slot files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maximum number of slot files.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of registered slot files; 0 when the folder is missing or unreadable.
    pub fn current_count(&self) -> usize {
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return 0;
        };
        read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| is_slot_file(&entry.path()))
            .count()
    }

    /// Free slots left.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.current_count())
    }

    /// List registered slots ordered by index.
    pub fn entries(&self) -> Result<Vec<SlotEntry>> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LibraryError::io(&self.dir, e)),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| LibraryError::io(&self.dir, e))?;
            let path = entry.path();
            if !is_slot_file(&path) {
                continue;
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping unreadable AppList file {}: {}", path.display(), e);
                    continue;
                }
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            entries.push(SlotEntry {
                index: slot_index(&path),
                app_id: content.trim().to_string(),
                path,
                modified,
            });
        }

        entries.sort_by(|a, b| match (a.index, b.index) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.path.cmp(&b.path),
        });
        Ok(entries)
    }

    /// Whether `app_id` already occupies a slot.
    pub fn contains(&self, app_id: &str) -> bool {
        match self.entries() {
            Ok(entries) => entries.iter().any(|e| e.app_id == app_id),
            Err(e) => {
                warn!("Could not read AppList {}: {}", self.dir.display(), e);
                false
            }
        }
    }

    /// Register `app_ids`, in order, into the lowest free slot indices.
    ///
    /// Capacity is checked before any file is written. A write failure removes
    /// the files this call already wrote, so the folder is left as it was.
    pub fn reserve(&self, app_ids: &[String]) -> Result<Vec<PathBuf>> {
        let current = self.current_count();
        let remaining = self.capacity.saturating_sub(current);
        if remaining < app_ids.len() {
            return Err(LibraryError::CapacityExceeded {
                current,
                capacity: self.capacity,
                requested: app_ids.len(),
                remaining,
            });
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| LibraryError::io(&self.dir, e))?;
        let used: BTreeSet<usize> = self.entries()?.iter().filter_map(|e| e.index).collect();

        let mut written: Vec<PathBuf> = Vec::with_capacity(app_ids.len());
        let mut next = 0;
        for app_id in app_ids {
            while used.contains(&next) {
                next += 1;
            }
            let path = self.dir.join(format!("{next}.txt"));
            if let Err(e) = std::fs::write(&path, app_id) {
                for done in &written {
                    if let Err(cleanup) = std::fs::remove_file(done) {
                        warn!("Failed to roll back {}: {}", done.display(), cleanup);
                    }
                }
                return Err(LibraryError::io(path, e));
            }
            debug!("Registered {} in {}", app_id, path.display());
            written.push(path);
            next += 1;
        }

        info!(
            "Reserved {} AppList slot(s) in {} ({}/{})",
            written.len(),
            self.dir.display(),
            current + written.len(),
            self.capacity
        );
        Ok(written)
    }

    /// Remove every slot holding one of `app_ids` and renumber the rest.
    ///
    /// Ids without a slot are ignored. Returns the number of files removed.
    pub fn release(&self, app_ids: &[String]) -> Result<usize> {
        let entries = self.entries()?;
        let mut removed = 0;
        let mut failure = None;

        for entry in entries.iter().filter(|e| app_ids.contains(&e.app_id)) {
            match std::fs::remove_file(&entry.path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {}", entry.path.display(), e);
                    failure.get_or_insert(LibraryError::io(&entry.path, e));
                }
            }
        }

        if removed > 0 {
            self.compact()?;
            info!(
                "Released {} AppList slot(s) from {}",
                removed,
                self.dir.display()
            );
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// Renumber numeric slot files to `0..n` so GreenLuma sees no gaps.
    fn compact(&self) -> Result<()> {
        let numbered = self.entries()?.into_iter().filter(|e| e.index.is_some());
        for (target, entry) in numbered.enumerate() {
            if entry.index == Some(target) {
                continue;
            }
            let dest = self.dir.join(format!("{target}.txt"));
            std::fs::rename(&entry.path, &dest).map_err(|e| LibraryError::io(&entry.path, e))?;
        }
        Ok(())
    }
}

fn is_slot_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "txt")
}

fn slot_index(path: &Path) -> Option<usize> {
    path.file_stem()?.to_str()?.parse().ok()
}
