//! Install archives: zip files holding `<appid>.lua` and depot `.manifest` files.

use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::lua::is_lua_filename;
use super::{ArchiveExtractor, ExtractPlan, ExtractReport};
use crate::error::{LibraryError, Result};

fn open(archive: &Path) -> Result<zip::ZipArchive<std::fs::File>> {
    let file = std::fs::File::open(archive).map_err(|e| LibraryError::io(archive, e))?;
    zip::ZipArchive::new(file).map_err(|source| LibraryError::Archive {
        path: archive.to_path_buf(),
        source,
    })
}

/// Final component of a sanitised entry path; `None` for entries escaping the archive root.
fn entry_file_name(enclosed: Option<PathBuf>) -> Option<String> {
    Some(enclosed?.file_name()?.to_str()?.to_string())
}

/// Depot id of a `<depot>_<manifest>.manifest` file name.
fn manifest_depot(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(".manifest")?;
    let depot = stem.split('_').next()?;
    (!depot.is_empty() && depot.chars().all(|c| c.is_ascii_digit())).then_some(depot)
}

/// Every `<digits>.lua` entry in the archive as `(file name, content)`.
pub fn read_lua_files(archive: &Path) -> Result<Vec<(String, String)>> {
    let mut zip = open(archive)?;
    let mut files = Vec::new();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|source| LibraryError::Archive {
            path: archive.to_path_buf(),
            source,
        })?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry_file_name(entry.enclosed_name()) else {
            continue;
        };
        let name = name.to_ascii_lowercase();
        if !is_lua_filename(&name) {
            continue;
        }
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| LibraryError::io(archive, e))?;
        files.push((name, content));
    }
    Ok(files)
}

/// [`ArchiveExtractor`] for zip files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchives;

impl ArchiveExtractor for ZipArchives {
    fn read_lua(&self, archive: &Path, app_id: &str) -> Result<Option<String>> {
        let mut files = read_lua_files(archive)?;
        let wanted = format!("{app_id}.lua");
        match files.iter().position(|(name, _)| *name == wanted) {
            Some(index) => Ok(Some(files.swap_remove(index).1)),
            None => Ok(files.into_iter().next().map(|(_, content)| content)),
        }
    }

    fn extract(&self, archive: &Path, plan: &ExtractPlan) -> Result<ExtractReport> {
        let mut zip = open(archive)?;
        let mut report = ExtractReport::default();

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(|source| LibraryError::Archive {
                path: archive.to_path_buf(),
                source,
            })?;
            if entry.is_dir() {
                continue;
            }
            let Some(name) = entry_file_name(entry.enclosed_name()) else {
                debug!("Skipping unsafe entry {}", entry.name());
                report.skipped += 1;
                continue;
            };

            let lower = name.to_ascii_lowercase();
            let is_lua = is_lua_filename(&lower);
            let dest_dir = if is_lua {
                &plan.lua_dir
            } else if lower.ends_with(".manifest") {
                let wanted = match (&plan.depot_filter, manifest_depot(&lower)) {
                    (None, _) => true,
                    (Some(filter), Some(depot)) => filter.iter().any(|id| id == depot),
                    (Some(_), None) => false,
                };
                if !wanted {
                    report.skipped += 1;
                    continue;
                }
                &plan.depotcache_dir
            } else {
                report.skipped += 1;
                continue;
            };

            std::fs::create_dir_all(dest_dir).map_err(|e| LibraryError::io(dest_dir, e))?;
            let dest: PathBuf = dest_dir.join(if is_lua { &lower } else { &name });
            let mut out = std::fs::File::create(&dest).map_err(|e| LibraryError::io(&dest, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| LibraryError::io(&dest, e))?;

            if is_lua {
                report.lua_files.push(dest);
            } else {
                report.manifests.push(dest);
            }
        }

        info!(
            "Extracted {} lua and {} manifest file(s) from {}",
            report.lua_files.len(),
            report.manifests.len(),
            archive.display()
        );
        Ok(report)
    }
}
