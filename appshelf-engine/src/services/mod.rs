//! Collaborators the catalog and the workflows talk to.
//!
//! Each concern is a trait so the core can run against in-memory fakes in
//! tests; [`Services::from_settings`] wires the filesystem and network
//! implementations used by the binary.
//!
//! # Module Structure
//!
//! - `lua`: `<appid>.lua` descriptors in `config/stplug-in`
//! - `steam`: installed Steam games and generated app manifests
//! - `names`: the public Steam app list
//! - `depots`: depot candidates for a GreenLuma install
//! - `keys`: the combined depot key store
//! - `cache`: cached icons and manifest metadata
//! - `archive`: zip extraction into the Steam folder

pub mod archive;
pub mod cache;
pub mod depots;
pub mod keys;
pub mod lua;
pub mod names;
pub mod steam;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{LibraryError, Result};
use crate::slots::AppList;
use crate::storage::ShelfStorage;

/// Name reported for ids missing from the app list.
pub const UNKNOWN_GAME: &str = "Unknown Game";

/// Public CDN header image for an app, used as the remote icon source.
#[must_use]
pub fn steam_cdn_icon_url(app_id: &str) -> String {
    format!("https://cdn.cloudflare.steamstatic.com/steam/apps/{app_id}/header.jpg")
}

/// One lua descriptor file.
#[derive(Debug, Clone, PartialEq)]
pub struct LuaEntry {
    pub app_id: String,
    pub enabled: bool,
    pub path: PathBuf,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Result of patching a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Patched,
    AlreadyPatched,
}

/// Lua descriptor files keyed by app id.
pub trait DescriptorStore: Send + Sync {
    /// All descriptors, enabled or not.
    fn enumerate(&self) -> Result<Vec<LuaEntry>>;

    /// Existing file for `app_id`, enabled name first.
    fn path_of(&self, app_id: &str) -> Option<PathBuf>;

    /// Content of the descriptor, `None` when there is none.
    fn read(&self, app_id: &str) -> Result<Option<String>>;

    fn patch(&self, app_id: &str) -> Result<PatchOutcome>;

    /// Returns a message for the user.
    fn enable(&self, app_id: &str) -> Result<String>;

    /// Returns a message for the user.
    fn disable(&self, app_id: &str) -> Result<String>;

    /// Returns a message for the user.
    fn delete(&self, app_id: &str) -> Result<String>;

    /// Depot id to decryption key pairs declared by the descriptor.
    fn extract_keys(&self, app_id: &str) -> Result<BTreeMap<String, String>>;

    /// Copy dropped descriptor files, or those inside dropped archives, into
    /// the store. Returns how many were added.
    fn import(&self, paths: &[PathBuf]) -> Result<usize>;
}

/// A game installed through the Steam client.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledGame {
    pub app_id: String,
    pub name: String,
    pub size_bytes: u64,
    /// Library root holding the `steamapps` folder.
    pub library_path: PathBuf,
    pub install_dir: Option<PathBuf>,
    pub last_updated: Option<DateTime<Utc>>,
    pub manifest_path: PathBuf,
}

/// The Steam client's installed application list.
pub trait NativePlatform: Send + Sync {
    fn list_installed(&self) -> Result<Vec<InstalledGame>>;

    /// Remove the game folder and its app manifest.
    fn uninstall(&self, app_id: &str) -> Result<()>;

    /// Icon shipped in the client's library cache.
    fn local_icon(&self, app_id: &str) -> Option<PathBuf>;

    /// Write `appmanifest_<id>.acf` so the client lists the app.
    ///
    /// `library` selects a library root; `None` uses the Steam folder.
    fn write_app_manifest(&self, app_id: &str, name: &str, library: Option<&Path>)
    -> Result<PathBuf>;

    /// Remove a generated app manifest. Returns whether a file was removed.
    fn remove_app_manifest(&self, app_id: &str) -> Result<bool>;
}

/// Snapshot of the Steam app list.
#[derive(Debug, Clone, Default)]
pub struct AppNames {
    names: HashMap<String, String>,
}

impl AppNames {
    #[must_use]
    pub fn lookup(&self, app_id: &str) -> Option<&str> {
        self.names.get(app_id).map(String::as_str)
    }

    /// Name for display, [`UNKNOWN_GAME`] when the id is unknown.
    #[must_use]
    pub fn display_name(&self, app_id: &str) -> &str {
        self.lookup(app_id).unwrap_or(UNKNOWN_GAME)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AppNames {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            names: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Bulk app id to name index.
#[async_trait]
pub trait NameIndex: Send + Sync {
    /// The full index, fetched or loaded from cache.
    async fn app_names(&self) -> Result<Arc<AppNames>>;

    /// Single id lookup.
    async fn name_of(&self, app_id: &str) -> Option<String> {
        match self.app_names().await {
            Ok(names) => names.lookup(app_id).map(str::to_string),
            Err(e) => {
                tracing::warn!("App list unavailable for {}: {}", app_id, e);
                None
            }
        }
    }
}

/// A depot offered for selection during a GreenLuma install.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepotInfo {
    pub depot_id: String,
    pub name: String,
    pub size_bytes: u64,
}

/// Depot candidates for one app.
#[async_trait]
pub trait RemoteMemberInfo: Send + Sync {
    /// Depots declared in `lua_content` combined with remote depot data.
    ///
    /// Never fails; remote errors degrade to the lua-derived list.
    async fn combined_depots(&self, app_id: &str, lua_content: Option<&str>) -> Vec<DepotInfo>;
}

/// Persistent depot id to key mapping.
pub trait KeyedConfigStore: Send + Sync {
    /// Add or overwrite `keys`, leaving other ids untouched. Returns how many were written.
    fn merge(&self, keys: &BTreeMap<String, String>) -> Result<usize>;

    /// Drop the given ids. Returns how many were present.
    fn remove(&self, ids: &[String]) -> Result<usize>;
}

/// Icon lookup, cache first.
#[async_trait]
pub trait IconCache: Send + Sync {
    /// Cached icon for `app_id`, filling the cache from `local_hint` or
    /// `remote_hint` on a miss. `None` when nothing could be found.
    async fn icon_path(
        &self,
        app_id: &str,
        local_hint: Option<PathBuf>,
        remote_hint: Option<String>,
    ) -> Option<PathBuf>;
}

/// Metadata cached for an app by earlier downloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

pub trait ManifestCache: Send + Sync {
    fn cached_manifest(&self, app_id: &str) -> Option<CachedManifest>;
}

/// Where extracted files go.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractPlan {
    /// Destination of `.lua` files.
    pub lua_dir: PathBuf,
    /// Destination of `.manifest` files.
    pub depotcache_dir: PathBuf,
    /// When set, only manifests whose depot id is listed are extracted.
    pub depot_filter: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractReport {
    pub lua_files: Vec<PathBuf>,
    pub manifests: Vec<PathBuf>,
    pub skipped: usize,
}

/// Install archive reader.
pub trait ArchiveExtractor: Send + Sync {
    /// The `<app_id>.lua` content inside the archive, or the first lua entry.
    fn read_lua(&self, archive: &Path, app_id: &str) -> Result<Option<String>>;

    fn extract(&self, archive: &Path, plan: &ExtractPlan) -> Result<ExtractReport>;
}

/// Folders inside a Steam installation.
#[derive(Debug, Clone, PartialEq)]
pub struct SteamLayout {
    pub root: PathBuf,
}

impl SteamLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn stplug_in(&self) -> PathBuf {
        self.root.join("config").join("stplug-in")
    }

    pub fn depotcache(&self) -> PathBuf {
        self.root.join("depotcache")
    }

    pub fn steamapps(&self) -> PathBuf {
        self.root.join("steamapps")
    }
}

/// Every collaborator, shared behind `Arc`.
#[derive(Clone)]
pub struct Services {
    pub layout: SteamLayout,
    pub applist: AppList,
    pub descriptors: Arc<dyn DescriptorStore>,
    pub platform: Arc<dyn NativePlatform>,
    pub names: Arc<dyn NameIndex>,
    pub depots: Arc<dyn RemoteMemberInfo>,
    pub keys: Arc<dyn KeyedConfigStore>,
    pub icons: Arc<dyn IconCache>,
    pub manifests: Arc<dyn ManifestCache>,
    pub archives: Arc<dyn ArchiveExtractor>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("layout", &self.layout)
            .field("applist", &self.applist)
            .finish_non_exhaustive()
    }
}

impl Services {
    /// Wire the filesystem and network implementations.
    ///
    /// # Errors
    ///
    /// Returns an error if the Steam folder cannot be located or the HTTP
    /// client cannot be built.
    pub fn from_settings(settings: &Settings, storage: &ShelfStorage) -> Result<Self> {
        let root = settings.steam_path().ok_or(LibraryError::SteamPathMissing)?;
        let layout = SteamLayout::new(root);
        let http = names::http_client()?;

        let mut extra_libraries = Vec::new();
        if let Some(folder) = &settings.selected_library_folder {
            extra_libraries.push(folder.clone());
        }
        let cache = Arc::new(cache::CacheStore::new(storage, http.clone()));

        Ok(Self {
            applist: AppList::resolve(&layout.root, settings.custom_applist_dir()),
            descriptors: Arc::new(lua::LuaStore::new(layout.stplug_in())?),
            platform: Arc::new(steam::SteamLibrary::new(&layout.root, extra_libraries)),
            names: Arc::new(names::SteamAppList::new(
                storage.cache_dir().join("applist.json"),
                http.clone(),
            )),
            depots: Arc::new(depots::DepotInfoClient::new(http)?),
            keys: Arc::new(keys::KeyStore::new(settings.keys_path(storage.data_dir()))),
            icons: cache.clone(),
            manifests: cache,
            archives: Arc::new(archive::ZipArchives),
            layout,
        })
    }
}
