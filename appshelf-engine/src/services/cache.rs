//! Icon and manifest metadata cache under the XDG cache directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{CachedManifest, IconCache, ManifestCache};
use crate::storage::ShelfStorage;

#[derive(Debug, Clone)]
pub struct CacheStore {
    icons_dir: PathBuf,
    manifests_dir: PathBuf,
    http: reqwest::Client,
}

impl CacheStore {
    pub fn new(storage: &ShelfStorage, http: reqwest::Client) -> Self {
        Self::at(storage.icons_dir(), storage.manifests_dir(), http)
    }

    pub fn at(icons_dir: PathBuf, manifests_dir: PathBuf, http: reqwest::Client) -> Self {
        Self {
            icons_dir,
            manifests_dir,
            http,
        }
    }

    fn cached_icon(&self, app_id: &str) -> PathBuf {
        self.icons_dir.join(format!("{app_id}.jpg"))
    }

    async fn copy_local(&self, source: &Path, dest: &Path) -> Option<PathBuf> {
        tokio::fs::create_dir_all(&self.icons_dir).await.ok()?;
        match tokio::fs::copy(source, dest).await {
            Ok(_) => Some(dest.to_path_buf()),
            Err(e) => {
                debug!("Could not copy icon {}: {}", source.display(), e);
                None
            }
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Option<PathBuf> {
        let response = match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!("Icon request {} returned {}", url, response.status());
                return None;
            }
            Err(e) => {
                debug!("Icon request {} failed: {}", url, e);
                return None;
            }
        };
        let bytes = response.bytes().await.ok()?;
        if bytes.is_empty() {
            return None;
        }
        tokio::fs::create_dir_all(&self.icons_dir).await.ok()?;
        match tokio::fs::write(dest, &bytes).await {
            Ok(()) => Some(dest.to_path_buf()),
            Err(e) => {
                warn!("Failed to cache icon {}: {}", dest.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl IconCache for CacheStore {
    async fn icon_path(
        &self,
        app_id: &str,
        local_hint: Option<PathBuf>,
        remote_hint: Option<String>,
    ) -> Option<PathBuf> {
        let cached = self.cached_icon(app_id);
        if tokio::fs::metadata(&cached).await.is_ok_and(|m| m.len() > 0) {
            return Some(cached);
        }
        if let Some(local) = local_hint {
            if let Some(path) = self.copy_local(&local, &cached).await {
                return Some(path);
            }
        }
        match remote_hint {
            Some(url) => self.download(&url, &cached).await,
            None => None,
        }
    }
}

impl ManifestCache for CacheStore {
    fn cached_manifest(&self, app_id: &str) -> Option<CachedManifest> {
        let path = self.manifests_dir.join(format!("{app_id}.json"));
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!("Ignoring corrupt cached manifest {}: {}", path.display(), e);
                None
            }
        }
    }
}
