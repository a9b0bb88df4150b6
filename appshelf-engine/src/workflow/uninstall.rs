//! Remove catalog items and everything they left on disk.

use tracing::{info, warn};

use crate::catalog::{CatalogItem, ItemKind};
use crate::error::{LibraryError, Result};
use crate::services::Services;
use crate::storage::ShelfStorage;

/// Uninstall one item. Returns a message for the user.
///
/// # Errors
///
/// Lua and Steam items fail with their collaborator's error. A GreenLuma item
/// attempts every removal step and fails with
/// [`LibraryError::PartialUninstall`] listing the steps that did not succeed.
pub fn uninstall(services: &Services, storage: &ShelfStorage, item: &CatalogItem) -> Result<String> {
    match item.kind {
        ItemKind::Lua => services.descriptors.delete(&item.app_id),
        ItemKind::SteamGame => {
            services.platform.uninstall(&item.app_id)?;
            Ok(format!("Uninstalled {}", item.name))
        }
        ItemKind::GreenLuma => uninstall_greenluma(services, storage, item),
    }
}

fn uninstall_greenluma(
    services: &Services,
    storage: &ShelfStorage,
    item: &CatalogItem,
) -> Result<String> {
    let app_id = item.app_id.as_str();
    let mut failures = Vec::new();

    let record = match storage.load_ledger() {
        Ok(ledger) => ledger.apps.get(app_id).cloned(),
        Err(e) => {
            failures.push(format!("install ledger: {e}"));
            None
        }
    };
    let slot_ids: Vec<String> = match &record {
        Some(record) => record.slot_ids(),
        None => {
            let depots: Vec<String> = match services.descriptors.extract_keys(app_id) {
                Ok(keys) => keys.into_keys().filter(|id| id != app_id).collect(),
                Err(e) => {
                    failures.push(format!("depot list: {e}"));
                    Vec::new()
                }
            };
            std::iter::once(app_id.to_string()).chain(depots).collect()
        }
    };
    let depot_count = slot_ids.len().saturating_sub(1);

    match services.applist.release(&slot_ids) {
        Ok(removed) => info!("Removed {} AppList slot(s) for {}", removed, app_id),
        Err(e) => failures.push(format!("AppList: {e}")),
    }

    let manifest_removed = match record.as_ref().and_then(|r| r.app_manifest.as_ref()) {
        Some(path) => match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LibraryError::io(path, e)),
        },
        None => services.platform.remove_app_manifest(app_id),
    };
    if let Err(e) = manifest_removed {
        failures.push(format!("app manifest: {e}"));
    }

    if let Err(e) = services.keys.remove(&slot_ids) {
        failures.push(format!("depot keys: {e}"));
    }

    if services.descriptors.path_of(app_id).is_some() {
        if let Err(e) = services.descriptors.delete(app_id) {
            failures.push(format!("lua file: {e}"));
        }
    }

    if failures.is_empty() {
        // Kept on failure so a retry still knows the depots.
        if let Err(e) = storage.forget_install(app_id) {
            failures.push(format!("install ledger: {e}"));
        }
    }

    if failures.is_empty() {
        info!("Uninstalled GreenLuma app {} ({})", item.name, app_id);
        Ok(format!("Uninstalled {} and {} depot(s)", item.name, depot_count))
    } else {
        for failure in &failures {
            warn!("Uninstall of {} incomplete: {}", app_id, failure);
        }
        Err(LibraryError::PartialUninstall {
            app_id: app_id.to_string(),
            failures,
        })
    }
}

/// Uninstall every item, continuing past failures. Returns how many succeeded.
pub fn uninstall_batch(services: &Services, storage: &ShelfStorage, items: &[CatalogItem]) -> usize {
    items
        .iter()
        .filter(|item| match uninstall(services, storage, item) {
            Ok(message) => {
                info!("{}", message);
                true
            }
            Err(e) => {
                warn!("Failed to uninstall {} ({}): {}", item.name, item.app_id, e);
                false
            }
        })
        .count()
}
