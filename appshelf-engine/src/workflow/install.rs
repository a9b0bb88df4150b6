//! Install one downloaded archive.

use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::{InstallPrompts, InstallState};
use crate::config::Settings;
use crate::error::{LibraryError, Result};
use crate::services::{DepotInfo, ExtractPlan, ExtractReport, Services};
use crate::storage::{InstalledApp, ShelfStorage};

/// A finished install.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallSummary {
    pub app_id: String,
    pub name: String,
    /// Depots registered next to the app, GreenLuma only.
    pub depots: Vec<String>,
    pub app_manifest: Option<PathBuf>,
    pub extracted: ExtractReport,
    pub keys_merged: usize,
    pub archive_deleted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstallOutcome {
    Installed(InstallSummary),
    Cancelled { reason: String },
}

/// Runs installs one at a time and publishes their state.
#[derive(Debug)]
pub struct Installer {
    state: watch::Sender<InstallState>,
}

impl Default for Installer {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks an unfinished install as failed when dropped.
struct ActiveInstall<'a> {
    state: &'a watch::Sender<InstallState>,
}

impl ActiveInstall<'_> {
    fn enter(&self, next: InstallState) {
        info!("Install: {}", next.message());
        self.state.send_replace(next);
    }
}

impl Drop for ActiveInstall<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if state.is_active() {
                *state = InstallState::Failed;
                true
            } else {
                false
            }
        });
    }
}

impl Installer {
    pub fn new() -> Self {
        Self {
            state: watch::channel(InstallState::Idle).0,
        }
    }

    /// Follow state transitions, e.g. to drive a progress display.
    pub fn subscribe(&self) -> watch::Receiver<InstallState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> InstallState {
        *self.state.borrow()
    }

    fn begin(&self) -> Result<ActiveInstall<'_>> {
        let started = self.state.send_if_modified(|state| {
            if state.is_active() {
                false
            } else {
                *state = InstallState::Validating;
                true
            }
        });
        if !started {
            return Err(LibraryError::Busy);
        }
        info!("Install: {}", InstallState::Validating.message());
        Ok(ActiveInstall { state: &self.state })
    }

    /// Install `archive`, whose file stem is the app id.
    ///
    /// # Errors
    ///
    /// - [`LibraryError::Busy`] while another install runs
    /// - [`LibraryError::DuplicateIdentifier`], [`LibraryError::UnknownIdentifier`]
    ///   and [`LibraryError::CapacityExceeded`] before anything is written
    /// - I/O and archive errors; slots reserved and files extracted before the
    ///   failure are left in place for uninstall to clean up
    pub async fn install(
        &self,
        services: &Services,
        storage: &ShelfStorage,
        settings: &Settings,
        archive: &Path,
        prompts: &dyn InstallPrompts,
    ) -> Result<InstallOutcome> {
        let active = self.begin()?;
        let result = run(&active, services, storage, settings, archive, prompts).await;
        match &result {
            Ok(InstallOutcome::Installed(summary)) => {
                info!("Installed {} ({})", summary.name, summary.app_id);
                active.enter(InstallState::Done);
            }
            Ok(InstallOutcome::Cancelled { reason }) => {
                info!("Install of {} cancelled: {}", archive.display(), reason);
                active.enter(InstallState::Cancelled);
            }
            Err(e) => {
                error!("Install of {} failed: {}", archive.display(), e);
                active.enter(InstallState::Failed);
            }
        }
        result
    }
}

/// App id of an archive named `<digits>.zip`.
fn app_id_of(archive: &Path) -> Option<String> {
    let file_name = archive.file_name()?.to_str()?.trim();
    let split = file_name.len().checked_sub(".zip".len())?;
    let (stem, extension) = (file_name.get(..split)?, file_name.get(split..)?);
    if !extension.eq_ignore_ascii_case(".zip") {
        return None;
    }
    (!stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit())).then(|| stem.to_string())
}

/// Keep known depot ids once each, in the order given, at most `max` of them.
fn sanitize_selection(picked: Vec<String>, depots: &[DepotInfo], max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    picked
        .into_iter()
        .filter(|id| depots.iter().any(|d| &d.depot_id == id))
        .filter(|id| seen.insert(id.clone()))
        .take(max)
        .collect()
}

/// In GreenLuma mode the main id always takes a slot, even when the archive
/// offers no depots.
async fn run(
    active: &ActiveInstall<'_>,
    services: &Services,
    storage: &ShelfStorage,
    settings: &Settings,
    archive: &Path,
    prompts: &dyn InstallPrompts,
) -> Result<InstallOutcome> {
    let app_id = app_id_of(archive).ok_or_else(|| LibraryError::UnknownIdentifier {
        app_id: archive.display().to_string(),
    })?;
    let greenluma = settings.is_greenluma();
    let applist = &services.applist;

    let mut name = app_id.clone();
    let mut selected: Option<Vec<String>> = None;
    let mut app_manifest = None;

    if greenluma {
        if applist.contains(&app_id) {
            return Err(LibraryError::DuplicateIdentifier { app_id });
        }
        name = services
            .names
            .name_of(&app_id)
            .await
            .ok_or_else(|| LibraryError::UnknownIdentifier {
                app_id: app_id.clone(),
            })?;

        active.enter(InstallState::SelectingMembers);
        let capacity = applist.capacity();
        let current = applist.current_count();
        let remaining = applist.remaining();
        if remaining == 0 {
            return Err(LibraryError::CapacityExceeded {
                current,
                capacity,
                requested: 1,
                remaining,
            });
        }

        let lua = services.archives.read_lua(archive, &app_id)?;
        let depots = services.depots.combined_depots(&app_id, lua.as_deref()).await;
        if !depots.is_empty() {
            let max = remaining - 1;
            if max == 0 {
                return Err(LibraryError::CapacityExceeded {
                    current,
                    capacity,
                    requested: 2,
                    remaining,
                });
            }
            if max < depots.len() {
                warn!(
                    "Only {} of {} depots fit into the AppList ({}/{})",
                    max,
                    depots.len(),
                    current,
                    capacity
                );
                prompts.capacity_warning(max, current, capacity);
            }
            let chosen = sanitize_selection(prompts.select_depots(&depots, max), &depots, max);
            if chosen.is_empty() {
                return Ok(InstallOutcome::Cancelled {
                    reason: "no depots selected".to_string(),
                });
            }
            selected = Some(chosen);
        }

        active.enter(InstallState::ReservingSlots);
        let depots = selected.clone().unwrap_or_default();
        let slot_ids: Vec<String> = std::iter::once(app_id.clone())
            .chain(depots.iter().cloned())
            .collect();
        applist.reserve(&slot_ids)?;

        let manifest = services.platform.write_app_manifest(
            &app_id,
            &name,
            settings.install_library_folder(),
        )?;
        storage.record_install(InstalledApp {
            app_id: app_id.clone(),
            name: name.clone(),
            depots,
            installed_at: Utc::now(),
            app_manifest: Some(manifest.clone()),
        })?;
        app_manifest = Some(manifest);
    }

    active.enter(InstallState::Extracting);
    let plan = ExtractPlan {
        lua_dir: services.layout.stplug_in(),
        depotcache_dir: services.layout.depotcache(),
        depot_filter: selected.as_ref().map(|depots| {
            std::iter::once(app_id.clone())
                .chain(depots.iter().cloned())
                .collect()
        }),
    };
    let extracted = services.archives.extract(archive, &plan)?;

    let mut keys_merged = 0;
    if greenluma {
        active.enter(InstallState::UpdatingConfig);
        let keys = services.descriptors.extract_keys(&app_id)?;
        if !keys.is_empty() {
            keys_merged = services.keys.merge(&keys)?;
        }
    }

    let archive_deleted = prompts.confirm_delete_archive(archive)
        && match std::fs::remove_file(archive) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to delete {}: {}", archive.display(), e);
                false
            }
        };

    Ok(InstallOutcome::Installed(InstallSummary {
        app_id,
        name,
        depots: selected.unwrap_or_default(),
        app_manifest,
        extracted,
        keys_merged,
        archive_deleted,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolMode;
    use crate::services::DepotInfo;
    use crate::services::archive::tests::write_zip;
    use crate::services::keys::KeyStore;
    use crate::testing::Fixture;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    const LUA: &str = "addappid(570)\n\
addappid(571, 1, \"aa11\") -- Content\n\
addappid(572, 1, \"bb22\") -- German\n\
addappid(573, 1, \"cc33\") -- French\n";

    struct Scripted {
        select: Mutex<Option<Vec<String>>>,
        warned: AtomicBool,
        offered_max: Mutex<Option<usize>>,
        delete_archive: bool,
    }

    impl Scripted {
        /// Select every offered depot, up to the limit.
        fn all() -> Self {
            Self {
                select: Mutex::new(None),
                warned: AtomicBool::new(false),
                offered_max: Mutex::new(None),
                delete_archive: false,
            }
        }

        fn choosing(ids: &[&str]) -> Self {
            let scripted = Self::all();
            if let Ok(mut select) = scripted.select.lock() {
                *select = Some(ids.iter().map(|id| id.to_string()).collect());
            }
            scripted
        }
    }

    impl InstallPrompts for Scripted {
        fn capacity_warning(&self, _max: usize, _current: usize, _capacity: usize) {
            self.warned.store(true, Ordering::SeqCst);
        }

        fn select_depots(&self, depots: &[DepotInfo], max: usize) -> Vec<String> {
            if let Ok(mut offered) = self.offered_max.lock() {
                *offered = Some(max);
            }
            match self.select.lock().ok().and_then(|s| s.clone()) {
                Some(ids) => ids,
                None => depots.iter().take(max).map(|d| d.depot_id.clone()).collect(),
            }
        }

        fn confirm_delete_archive(&self, _archive: &Path) -> bool {
            self.delete_archive
        }
    }

    fn archive(fixture: &Fixture, app_id: &str) -> PathBuf {
        let path = fixture.temp.path().join(format!("{app_id}.zip"));
        let lua_name = format!("{app_id}.lua");
        write_zip(
            &path,
            &[
                (lua_name.as_str(), LUA),
                ("571_1.manifest", "a"),
                ("572_2.manifest", "b"),
                ("573_3.manifest", "c"),
            ],
        );
        path
    }

    fn filler(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("{}", 900_000 + i)).collect()
    }

    #[tokio::test]
    async fn test_steamtools_install_extracts_everything() -> Result<()> {
        let fixture = Fixture::new();
        let installer = Installer::new();
        let archive = archive(&fixture, "570");

        let outcome = installer
            .install(
                &fixture.services,
                &fixture.storage,
                &fixture.settings(ToolMode::SteamTools),
                &archive,
                &Scripted::all(),
            )
            .await?;

        let InstallOutcome::Installed(summary) = outcome else {
            panic!("expected install to finish");
        };
        assert_eq!(summary.extracted.manifests.len(), 3);
        assert!(summary.depots.is_empty());
        assert_eq!(fixture.services.applist.current_count(), 0);
        assert!(fixture.services.layout.stplug_in().join("570.lua").exists());
        assert_eq!(installer.state(), InstallState::Done);
        Ok(())
    }

    #[tokio::test]
    async fn test_greenluma_install_with_selected_depots() -> Result<()> {
        let fixture = Fixture::new();
        fixture.offer_depots(&[("571", "Content"), ("572", "German"), ("573", "French")]);
        let installer = Installer::new();
        let archive = archive(&fixture, "570");

        let outcome = installer
            .install(
                &fixture.services,
                &fixture.storage,
                &fixture.settings(ToolMode::GreenLuma),
                &archive,
                &Scripted::choosing(&["571", "573"]),
            )
            .await?;
        let InstallOutcome::Installed(summary) = outcome else {
            panic!("expected install to finish");
        };

        let slots: Vec<_> = fixture
            .services
            .applist
            .entries()?
            .into_iter()
            .map(|e| e.app_id)
            .collect();
        assert_eq!(slots, vec!["570", "571", "573"]);
        assert_eq!(summary.name, "Dota 2");
        assert_eq!(summary.extracted.manifests.len(), 2);
        assert!(!fixture.services.layout.depotcache().join("572_2.manifest").exists());
        assert!(summary.app_manifest.as_ref().is_some_and(|p| p.exists()));
        assert_eq!(summary.keys_merged, 3);

        let ledger = fixture.storage.load_ledger()?;
        assert_eq!(ledger.apps["570"].depots, vec!["571", "573"]);
        let keys = KeyStore::new(fixture.storage.data_dir().join("depot_keys.toml")).load()?;
        assert_eq!(keys.get("572").map(String::as_str), Some("bb22"));
        Ok(())
    }

    #[tokio::test]
    async fn test_last_slot_without_depots() -> Result<()> {
        let fixture = Fixture::new();
        fixture.services.applist.reserve(&filler(127))?;
        let installer = Installer::new();

        let outcome = installer
            .install(
                &fixture.services,
                &fixture.storage,
                &fixture.settings(ToolMode::GreenLuma),
                &archive(&fixture, "570"),
                &Scripted::all(),
            )
            .await?;
        assert!(matches!(outcome, InstallOutcome::Installed(_)));
        assert_eq!(fixture.services.applist.current_count(), 128);
        Ok(())
    }

    #[tokio::test]
    async fn test_over_capacity_writes_nothing() -> Result<()> {
        let fixture = Fixture::new();
        fixture.offer_depots(&[("571", "Content"), ("572", "German")]);
        fixture.services.applist.reserve(&filler(127))?;
        let installer = Installer::new();

        let Err(err) = installer
            .install(
                &fixture.services,
                &fixture.storage,
                &fixture.settings(ToolMode::GreenLuma),
                &archive(&fixture, "570"),
                &Scripted::all(),
            )
            .await
        else {
            panic!("expected capacity failure");
        };
        match err {
            LibraryError::CapacityExceeded { remaining, .. } => assert_eq!(remaining, 1),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fixture.services.applist.current_count(), 127);
        assert!(!fixture.services.layout.stplug_in().join("570.lua").exists());
        assert_eq!(installer.state(), InstallState::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn test_selection_limited_by_capacity() -> Result<()> {
        let fixture = Fixture::new();
        fixture.offer_depots(&[("571", "Content"), ("572", "German"), ("573", "French")]);
        fixture.services.applist.reserve(&filler(125))?;
        let installer = Installer::new();
        let prompts = Scripted::all();

        installer
            .install(
                &fixture.services,
                &fixture.storage,
                &fixture.settings(ToolMode::GreenLuma),
                &archive(&fixture, "570"),
                &prompts,
            )
            .await?;
        assert!(prompts.warned.load(Ordering::SeqCst));
        assert_eq!(prompts.offered_max.lock().ok().and_then(|m| *m), Some(2));
        assert_eq!(fixture.services.applist.current_count(), 128);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_selection_cancels() -> Result<()> {
        let fixture = Fixture::new();
        fixture.offer_depots(&[("571", "Content")]);
        let installer = Installer::new();

        let outcome = installer
            .install(
                &fixture.services,
                &fixture.storage,
                &fixture.settings(ToolMode::GreenLuma),
                &archive(&fixture, "570"),
                &Scripted::choosing(&[]),
            )
            .await?;
        assert!(matches!(outcome, InstallOutcome::Cancelled { .. }));
        assert_eq!(installer.state(), InstallState::Cancelled);
        assert_eq!(fixture.services.applist.current_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown_ids_rejected() -> Result<()> {
        let fixture = Fixture::new();
        fixture.fill_applist(&["570"]);
        let installer = Installer::new();
        let settings = fixture.settings(ToolMode::GreenLuma);

        let duplicate = installer
            .install(
                &fixture.services,
                &fixture.storage,
                &settings,
                &archive(&fixture, "570"),
                &Scripted::all(),
            )
            .await;
        assert!(matches!(
            duplicate,
            Err(LibraryError::DuplicateIdentifier { .. })
        ));

        let unknown = installer
            .install(
                &fixture.services,
                &fixture.storage,
                &settings,
                &archive(&fixture, "123456"),
                &Scripted::all(),
            )
            .await;
        assert!(matches!(
            unknown,
            Err(LibraryError::UnknownIdentifier { .. })
        ));
        assert_eq!(fixture.services.applist.current_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_archive_when_confirmed() -> Result<()> {
        let fixture = Fixture::new();
        let installer = Installer::new();
        let archive = archive(&fixture, "570");
        let prompts = Scripted {
            delete_archive: true,
            ..Scripted::all()
        };

        let outcome = installer
            .install(
                &fixture.services,
                &fixture.storage,
                &fixture.settings(ToolMode::SteamTools),
                &archive,
                &prompts,
            )
            .await?;
        let InstallOutcome::Installed(summary) = outcome else {
            panic!("expected install to finish");
        };
        assert!(summary.archive_deleted);
        assert!(!archive.exists());
        Ok(())
    }

    #[test]
    fn test_busy_while_active() {
        let installer = Installer::new();
        let Ok(active) = installer.begin() else {
            panic!("first install should start");
        };
        assert!(matches!(installer.begin(), Err(LibraryError::Busy)));
        drop(active);
        assert_eq!(installer.state(), InstallState::Failed);
        assert!(installer.begin().is_ok());
    }

    #[test]
    fn test_app_id_from_archive_name() {
        assert_eq!(app_id_of(Path::new("/dl/570.zip")).as_deref(), Some("570"));
        assert_eq!(app_id_of(Path::new("/dl/.zip")), None);
        assert_eq!(app_id_of(Path::new("/dl/730.ZIP")).as_deref(), Some("730"));
        assert_eq!(app_id_of(Path::new("/dl/My Game (1).zip")), None);
        assert_eq!(app_id_of(Path::new("/dl/570.tar")), None);
        assert_eq!(app_id_of(Path::new("/dl/zip")), None);
    }

    #[tokio::test]
    async fn test_repeated_depot_takes_one_slot() -> Result<()> {
        let fixture = Fixture::new();
        fixture.offer_depots(&[("571", "Content"), ("572", "German")]);
        let installer = Installer::new();

        let outcome = installer
            .install(
                &fixture.services,
                &fixture.storage,
                &fixture.settings(ToolMode::GreenLuma),
                &archive(&fixture, "570"),
                &Scripted::choosing(&["571", "571", "999"]),
            )
            .await?;
        let InstallOutcome::Installed(summary) = outcome else {
            panic!("expected install to finish");
        };
        assert_eq!(summary.depots, vec!["571"]);
        let slots: Vec<String> = fixture
            .services
            .applist
            .entries()?
            .into_iter()
            .map(|e| e.app_id)
            .collect();
        assert_eq!(slots, vec!["570", "571"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_selection_keeps_first_that_fit() -> Result<()> {
        let fixture = Fixture::new();
        fixture.offer_depots(&[("571", "Content"), ("572", "German"), ("573", "French")]);
        fixture.services.applist.reserve(&filler(125))?;
        let installer = Installer::new();

        let outcome = installer
            .install(
                &fixture.services,
                &fixture.storage,
                &fixture.settings(ToolMode::GreenLuma),
                &archive(&fixture, "570"),
                &Scripted::choosing(&["571", "572", "573"]),
            )
            .await?;
        let InstallOutcome::Installed(summary) = outcome else {
            panic!("expected install to finish");
        };
        assert_eq!(summary.depots, vec!["571", "572"]);
        assert_eq!(fixture.services.applist.current_count(), 128);
        Ok(())
    }
}
