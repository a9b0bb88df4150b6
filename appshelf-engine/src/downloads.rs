//! Archives waiting in the downloads folder.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{LibraryError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadedArchive {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    /// Creation time where the filesystem records it, else modification time.
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadListing {
    pub archives: Vec<DownloadedArchive>,
    pub status: String,
}

/// List the `.zip` archives in `dir`, newest first.
///
/// # Errors
///
/// Returns an error if the folder exists but cannot be read. A missing or
/// unconfigured folder is an empty listing.
pub fn list_archives(dir: Option<&Path>) -> Result<DownloadListing> {
    let Some(dir) = dir.filter(|d| d.is_dir()) else {
        return Ok(DownloadListing {
            archives: Vec::new(),
            status: "No downloads folder configured".to_string(),
        });
    };

    let entries = std::fs::read_dir(dir).map_err(|e| LibraryError::io(dir, e))?;
    let mut archives = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LibraryError::io(dir, e))?;
        let path = entry.path();
        let is_zip = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
        if !is_zip {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| LibraryError::io(&path, e))?;
        if !metadata.is_file() {
            continue;
        }
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        archives.push(DownloadedArchive {
            file_name: entry.file_name().to_string_lossy().into_owned(),
            size_bytes: metadata.len(),
            created,
            path,
        });
    }
    archives.sort_by(|a, b| {
        b.created
            .cmp(&a.created)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });

    let status = if archives.is_empty() {
        "No downloaded files".to_string()
    } else {
        format!("{} file(s) ready to install", archives.len())
    };
    Ok(DownloadListing { archives, status })
}
