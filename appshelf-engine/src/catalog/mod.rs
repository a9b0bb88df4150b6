//! The merged catalog of installed items.
//!
//! A [`Catalog`] is rebuilt wholesale by [`builder::build`] from three
//! sources: lua descriptors, GreenLuma AppList slots and Steam games. Only
//! the icon field is written afterwards, by enrichment results applied
//! through [`Catalog::apply_icon`].

pub mod builder;
pub mod enrich;
pub mod view;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Where a catalog item comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A lua descriptor in `stplug-in`.
    Lua,
    /// An AppList slot.
    GreenLuma,
    /// A game installed by the Steam client.
    SteamGame,
}

impl ItemKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Lua => "Lua",
            Self::GreenLuma => "GreenLuma",
            Self::SteamGame => "Steam",
        }
    }

    /// Lua and GreenLuma items share one id namespace that outranks Steam games.
    #[must_use]
    pub fn is_override(self) -> bool {
        matches!(self, Self::Lua | Self::GreenLuma)
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogItem {
    pub app_id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    /// Remote icon source.
    pub icon_url: Option<String>,
    /// Cached icon, filled in by enrichment.
    pub icon_path: Option<PathBuf>,
    pub size_bytes: u64,
    pub installed_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub local_path: Option<PathBuf>,
    pub kind: ItemKind,
    /// `false` only for disabled lua descriptors.
    pub enabled: bool,
    #[serde(skip)]
    pub selected: bool,
}

impl CatalogItem {
    pub fn new(app_id: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            app_id: app_id.into(),
            name: String::new(),
            description: String::new(),
            version: String::new(),
            icon_url: None,
            icon_path: None,
            size_bytes: 0,
            installed_at: None,
            last_updated: None,
            local_path: None,
            kind,
            enabled: true,
            selected: false,
        }
    }
}

/// Per-kind counts and total size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub lua: usize,
    pub greenluma: usize,
    pub steam_games: usize,
    pub total_size: u64,
}

impl CatalogStats {
    fn of(items: &[CatalogItem]) -> Self {
        items.iter().fold(Self::default(), |mut stats, item| {
            match item.kind {
                ItemKind::Lua => stats.lua += 1,
                ItemKind::GreenLuma => stats.greenluma += 1,
                ItemKind::SteamGame => stats.steam_games += 1,
            }
            stats.total_size += item.size_bytes;
            stats
        })
    }
}

/// One catalog instance. `generation` tells instances apart across rebuilds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    generation: u64,
    items: Vec<CatalogItem>,
    stats: CatalogStats,
}

impl Catalog {
    pub fn new(generation: u64, items: Vec<CatalogItem>) -> Self {
        let stats = CatalogStats::of(&items);
        Self {
            generation,
            items,
            stats,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn stats(&self) -> CatalogStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, kind: ItemKind, app_id: &str) -> Option<&CatalogItem> {
        self.items
            .iter()
            .find(|item| item.kind == kind && item.app_id == app_id)
    }

    /// Item for `app_id`, preferring the override variants.
    pub fn find(&self, app_id: &str) -> Option<&CatalogItem> {
        self.items
            .iter()
            .find(|item| item.app_id == app_id && item.kind.is_override())
            .or_else(|| self.items.iter().find(|item| item.app_id == app_id))
    }

    /// Set the icon of one item. Returns whether the item exists.
    pub fn apply_icon(&mut self, kind: ItemKind, app_id: &str, path: PathBuf) -> bool {
        match self
            .items
            .iter_mut()
            .find(|item| item.kind == kind && item.app_id == app_id)
        {
            Some(item) => {
                item.icon_path = Some(path);
                true
            }
            None => false,
        }
    }

    pub fn set_selected(&mut self, index: usize, selected: bool) -> bool {
        match self.items.get_mut(index) {
            Some(item) => {
                item.selected = selected;
                true
            }
            None => false,
        }
    }

    pub fn clear_selection(&mut self) {
        for item in &mut self.items {
            item.selected = false;
        }
    }

    /// Selected items, in catalog order.
    pub fn selected(&self) -> Vec<&CatalogItem> {
        self.items.iter().filter(|item| item.selected).collect()
    }
}
