//! Shared fixtures: real filesystem services in a temp dir, fakes for the network.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::config::{Settings, ToolMode};
use crate::error::Result;
use crate::services::archive::ZipArchives;
use crate::services::keys::KeyStore;
use crate::services::lua::LuaStore;
use crate::services::steam::SteamLibrary;
use crate::services::{
    AppNames, CachedManifest, DepotInfo, IconCache, ManifestCache, NameIndex, RemoteMemberInfo,
    Services, SteamLayout,
};
use crate::slots::AppList;
use crate::storage::ShelfStorage;

pub(crate) struct FakeNames(pub Arc<AppNames>);

#[async_trait]
impl NameIndex for FakeNames {
    async fn app_names(&self) -> Result<Arc<AppNames>> {
        Ok(Arc::clone(&self.0))
    }
}

#[derive(Default)]
pub(crate) struct FakeDepots(pub Mutex<Vec<DepotInfo>>);

#[async_trait]
impl RemoteMemberInfo for FakeDepots {
    async fn combined_depots(&self, _app_id: &str, _lua: Option<&str>) -> Vec<DepotInfo> {
        self.0.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

/// Resolves icons for the listed ids and records how many lookups overlap.
#[derive(Default)]
pub(crate) struct FakeIcons {
    pub available: Mutex<HashSet<String>>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[async_trait]
impl IconCache for FakeIcons {
    async fn icon_path(
        &self,
        app_id: &str,
        _local_hint: Option<PathBuf>,
        _remote_hint: Option<String>,
    ) -> Option<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let known = self
            .available
            .lock()
            .map(|set| set.contains(app_id))
            .unwrap_or(false);
        known.then(|| PathBuf::from(format!("/icons/{app_id}.jpg")))
    }
}

#[derive(Default)]
pub(crate) struct FakeManifests(pub HashMap<String, CachedManifest>);

impl ManifestCache for FakeManifests {
    fn cached_manifest(&self, app_id: &str) -> Option<CachedManifest> {
        self.0.get(app_id).cloned()
    }
}

/// A Steam folder, XDG storage and wired services inside one temp dir.
pub(crate) struct Fixture {
    pub temp: TempDir,
    pub storage: ShelfStorage,
    pub services: Services,
    pub icons: Arc<FakeIcons>,
    pub depots: Arc<FakeDepots>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_manifests(FakeManifests::default())
    }

    pub fn with_manifests(manifests: FakeManifests) -> Self {
        let temp = match TempDir::new() {
            Ok(dir) => dir,
            Err(e) => panic!("Failed to create temp dir: {e}"),
        };
        let storage = match ShelfStorage::at(
            temp.path().join("config"),
            temp.path().join("cache"),
            temp.path().join("data"),
        ) {
            Ok(storage) => storage,
            Err(e) => panic!("Failed to create storage: {e}"),
        };
        let layout = SteamLayout::new(temp.path().join("steam"));
        let descriptors = match LuaStore::new(layout.stplug_in()) {
            Ok(store) => store,
            Err(e) => panic!("Failed to create lua store: {e}"),
        };
        let names: AppNames = [
            ("570", "Dota 2"),
            ("730", "Counter-Strike 2"),
            ("440", "Team Fortress 2"),
        ]
        .into_iter()
        .collect();
        let icons = Arc::new(FakeIcons::default());
        let depots = Arc::new(FakeDepots::default());

        let services = Services {
            applist: AppList::new(layout.root.join("AppList")),
            descriptors: Arc::new(descriptors),
            platform: Arc::new(SteamLibrary::new(&layout.root, Vec::new())),
            names: Arc::new(FakeNames(Arc::new(names))),
            depots: depots.clone(),
            keys: Arc::new(KeyStore::new(storage.data_dir().join("depot_keys.toml"))),
            icons: icons.clone(),
            manifests: Arc::new(manifests),
            archives: Arc::new(ZipArchives),
            layout,
        };
        Self {
            temp,
            storage,
            services,
            icons,
            depots,
        }
    }

    pub fn steam_root(&self) -> &Path {
        &self.services.layout.root
    }

    pub fn settings(&self, mode: ToolMode) -> Settings {
        Settings {
            mode,
            steam_path: Some(self.steam_root().to_path_buf()),
            ..Settings::default()
        }
    }

    pub fn write_lua(&self, name: &str, content: &str) {
        let dir = self.services.layout.stplug_in();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            panic!("Failed to create stplug-in: {e}");
        }
        if let Err(e) = std::fs::write(dir.join(name), content) {
            panic!("Failed to write {name}: {e}");
        }
    }

    pub fn write_acf(&self, app_id: &str, name: &str, size: u64) {
        let steamapps = self.services.layout.steamapps();
        if let Err(e) = std::fs::create_dir_all(steamapps.join("common").join(app_id)) {
            panic!("Failed to create game folder: {e}");
        }
        let acf = format!(
            "\"AppState\"\n{{\n\t\"appid\"\t\t\"{app_id}\"\n\t\"name\"\t\t\"{name}\"\n\t\"installdir\"\t\t\"{app_id}\"\n\t\"SizeOnDisk\"\t\t\"{size}\"\n}}\n"
        );
        if let Err(e) = std::fs::write(steamapps.join(format!("appmanifest_{app_id}.acf")), acf) {
            panic!("Failed to write manifest: {e}");
        }
    }

    pub fn fill_applist(&self, ids: &[&str]) {
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        if let Err(e) = self.services.applist.reserve(&ids) {
            panic!("Failed to fill AppList: {e}");
        }
    }

    pub fn allow_icons(&self, ids: &[&str]) {
        if let Ok(mut set) = self.icons.available.lock() {
            set.extend(ids.iter().map(|id| id.to_string()));
        }
    }

    pub fn offer_depots(&self, depots: &[(&str, &str)]) {
        if let Ok(mut offered) = self.depots.0.lock() {
            *offered = depots
                .iter()
                .map(|(id, name)| DepotInfo {
                    depot_id: id.to_string(),
                    name: name.to_string(),
                    size_bytes: 1024,
                })
                .collect();
        }
    }
}
