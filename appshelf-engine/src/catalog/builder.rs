//! Merge lua descriptors, AppList slots and Steam games into one catalog.
//!
//! Precedence: lua and GreenLuma items share one id namespace (lua first),
//! and a Steam game is only listed when neither claims its id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use super::{Catalog, CatalogItem, ItemKind};
use crate::config::ToolMode;
use crate::error::Result;
use crate::services::{AppNames, InstalledGame, LuaEntry, Services, steam_cdn_icon_url};
use crate::storage::InstallLedger;

/// Whether a stored GreenLuma name should be replaced from the app list.
#[must_use]
pub fn needs_name_backfill(name: &str, app_id: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.starts_with("App ") || name == app_id
}

/// Build a fresh catalog for `mode`.
///
/// # Errors
///
/// Returns an error if the lua folder exists but cannot be read. Steam games,
/// AppList slots and the app list are best-effort and only logged on failure.
pub async fn build(
    services: &Services,
    ledger: &InstallLedger,
    mode: ToolMode,
    generation: u64,
) -> Result<Catalog> {
    let native = services.platform.list_installed().unwrap_or_else(|e| {
        warn!("Failed to load Steam games: {}", e);
        Vec::new()
    });
    let native_by_id: HashMap<&str, &InstalledGame> =
        native.iter().map(|g| (g.app_id.as_str(), g)).collect();

    let names = services.names.app_names().await.unwrap_or_else(|e| {
        warn!("App list unavailable, names will be missing: {}", e);
        Arc::new(AppNames::default())
    });

    let mut items = Vec::new();
    let mut claimed: HashSet<String> = HashSet::new();

    if mode == ToolMode::SteamTools {
        for entry in services.descriptors.enumerate()? {
            if claimed.insert(entry.app_id.clone()) {
                items.push(lua_item(services, &names, &native_by_id, entry));
            }
        }
    }

    if mode == ToolMode::GreenLuma {
        match greenluma_items(services, ledger, &names, &native_by_id, &mut claimed) {
            Ok(found) => items.extend(found),
            Err(e) => warn!("Failed to load GreenLuma games: {}", e),
        }
    }

    for game in &native {
        if claimed.insert(game.app_id.clone()) {
            items.push(steam_item(game));
        }
    }

    let catalog = Catalog::new(generation, items);
    let stats = catalog.stats();
    info!(
        "Catalog {} built: {} lua, {} GreenLuma, {} Steam game(s)",
        generation, stats.lua, stats.greenluma, stats.steam_games
    );
    Ok(catalog)
}

fn lua_item(
    services: &Services,
    names: &AppNames,
    native: &HashMap<&str, &InstalledGame>,
    entry: LuaEntry,
) -> CatalogItem {
    let mut item = CatalogItem::new(&entry.app_id, ItemKind::Lua);
    match services.manifests.cached_manifest(&entry.app_id) {
        Some(cached) => {
            item.name = cached
                .name
                .unwrap_or_else(|| names.display_name(&entry.app_id).to_string());
            item.description = cached.description.unwrap_or_default();
            item.version = cached.version.unwrap_or_default();
            item.icon_url = cached.icon_url;
        }
        None => item.name = names.display_name(&entry.app_id).to_string(),
    }
    item.size_bytes = native.get(entry.app_id.as_str()).map_or(0, |g| g.size_bytes);
    item.icon_url = item
        .icon_url
        .or_else(|| Some(steam_cdn_icon_url(&entry.app_id)));
    item.installed_at = entry.created;
    item.last_updated = entry.modified;
    item.enabled = entry.enabled;
    item.local_path = Some(entry.path);
    item
}

fn greenluma_items(
    services: &Services,
    ledger: &InstallLedger,
    names: &AppNames,
    native: &HashMap<&str, &InstalledGame>,
    claimed: &mut HashSet<String>,
) -> Result<Vec<CatalogItem>> {
    let mut items = Vec::new();
    for slot in services.applist.entries()? {
        // Depot slots belong to the game that registered them.
        if ledger
            .owner_of_depot(&slot.app_id)
            .is_some_and(|owner| owner.app_id != slot.app_id)
        {
            continue;
        }
        if !claimed.insert(slot.app_id.clone()) {
            continue;
        }

        let record = ledger.apps.get(&slot.app_id);
        let stored = record.map(|r| r.name.as_str()).unwrap_or_default();
        let mut item = CatalogItem::new(&slot.app_id, ItemKind::GreenLuma);
        item.name = if needs_name_backfill(stored, &slot.app_id) {
            names.display_name(&slot.app_id).to_string()
        } else {
            stored.to_string()
        };
        if let Some(record) = record.filter(|r| !r.depots.is_empty()) {
            item.description = format!("{} depot(s)", record.depots.len());
        }
        item.size_bytes = native.get(slot.app_id.as_str()).map_or(0, |g| g.size_bytes);
        item.icon_url = Some(steam_cdn_icon_url(&slot.app_id));
        item.installed_at = record.map(|r| r.installed_at).or(slot.modified);
        item.last_updated = slot.modified;
        item.local_path = Some(slot.path);
        items.push(item);
    }
    Ok(items)
}

fn steam_item(game: &InstalledGame) -> CatalogItem {
    let mut item = CatalogItem::new(&game.app_id, ItemKind::SteamGame);
    item.name = game.name.clone();
    item.size_bytes = game.size_bytes;
    item.icon_url = Some(steam_cdn_icon_url(&game.app_id));
    item.last_updated = game.last_updated;
    item.local_path = game
        .install_dir
        .clone()
        .or_else(|| Some(game.library_path.clone()));
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::CachedManifest;
    use crate::storage::InstalledApp;
    use crate::testing::{FakeManifests, Fixture};
    use chrono::Utc;

    fn ledger_with(app_id: &str, name: &str, depots: &[&str]) -> InstallLedger {
        let mut ledger = InstallLedger::default();
        ledger.apps.insert(
            app_id.to_string(),
            InstalledApp {
                app_id: app_id.to_string(),
                name: name.to_string(),
                depots: depots.iter().map(|d| d.to_string()).collect(),
                installed_at: Utc::now(),
                app_manifest: None,
            },
        );
        ledger
    }

    #[test]
    fn test_needs_name_backfill() {
        assert!(needs_name_backfill("", "570"));
        assert!(needs_name_backfill("App 570", "570"));
        assert!(needs_name_backfill("570", "570"));
        assert!(!needs_name_backfill("Dota 2", "570"));
    }

    #[tokio::test]
    async fn test_lua_entry_suppresses_steam_game() -> Result<()> {
        let fixture = Fixture::new();
        fixture.write_lua("570.lua", "addappid(570)\n");
        fixture.write_acf("570", "Dota 2 (Steam)", 4096);
        fixture.write_acf("730", "Counter-Strike 2", 100);

        let catalog = build(
            &fixture.services,
            &InstallLedger::default(),
            ToolMode::SteamTools,
            1,
        )
        .await?;

        assert_eq!(catalog.len(), 2);
        let Some(dota) = catalog.find("570") else {
            panic!("expected 570 in catalog");
        };
        assert_eq!(dota.kind, ItemKind::Lua);
        assert_eq!(dota.name, "Dota 2");
        assert_eq!(dota.size_bytes, 4096);
        assert!(catalog.get(ItemKind::SteamGame, "570").is_none());
        assert_eq!(catalog.stats().total_size, 4196);
        Ok(())
    }

    #[tokio::test]
    async fn test_lua_uses_cached_manifest_and_unknown_fallback() -> Result<()> {
        let mut cached = FakeManifests::default();
        cached.0.insert(
            "730".to_string(),
            CachedManifest {
                name: Some("CS2 (cached)".to_string()),
                description: Some("Tactical shooter".to_string()),
                version: Some("1.0".to_string()),
                icon_url: Some("https://example.invalid/730.png".to_string()),
            },
        );
        let fixture = Fixture::with_manifests(cached);
        fixture.write_lua("730.lua", "");
        fixture.write_lua("999999.lua.disabled", "");

        let catalog = build(
            &fixture.services,
            &InstallLedger::default(),
            ToolMode::SteamTools,
            1,
        )
        .await?;

        let Some(cs) = catalog.get(ItemKind::Lua, "730") else {
            panic!("expected 730");
        };
        assert_eq!(cs.name, "CS2 (cached)");
        assert_eq!(cs.description, "Tactical shooter");
        assert_eq!(cs.icon_url.as_deref(), Some("https://example.invalid/730.png"));

        let Some(unknown) = catalog.get(ItemKind::Lua, "999999") else {
            panic!("expected 999999");
        };
        assert_eq!(unknown.name, crate::services::UNKNOWN_GAME);
        assert!(!unknown.enabled);
        Ok(())
    }

    #[tokio::test]
    async fn test_greenluma_mode_hides_lua_and_depot_slots() -> Result<()> {
        let fixture = Fixture::new();
        fixture.write_lua("440.lua", "");
        fixture.fill_applist(&["570", "571", "572", "730", "730"]);
        fixture.write_acf("730", "Counter-Strike 2", 10);
        let ledger = ledger_with("570", "App 570", &["571", "572"]);

        let catalog = build(&fixture.services, &ledger, ToolMode::GreenLuma, 3).await?;

        assert_eq!(catalog.generation(), 3);
        assert!(catalog.get(ItemKind::Lua, "440").is_none());
        let gl: Vec<_> = catalog
            .items()
            .iter()
            .filter(|i| i.kind == ItemKind::GreenLuma)
            .map(|i| (i.app_id.as_str(), i.name.as_str()))
            .collect();
        assert_eq!(gl, vec![("570", "Dota 2"), ("730", "Counter-Strike 2")]);
        assert!(catalog.get(ItemKind::SteamGame, "730").is_none());
        assert_eq!(catalog.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_ids_unique_within_override_family() -> Result<()> {
        let fixture = Fixture::new();
        fixture.write_lua("570.lua", "");
        fixture.write_lua("570.lua.disabled", "");
        fixture.write_acf("440", "Team Fortress 2", 1);

        let catalog = build(
            &fixture.services,
            &InstallLedger::default(),
            ToolMode::SteamTools,
            1,
        )
        .await?;
        let overrides = catalog
            .items()
            .iter()
            .filter(|i| i.kind.is_override())
            .count();
        assert_eq!(overrides, 1);
        assert_eq!(catalog.len(), 2);
        Ok(())
    }
}
