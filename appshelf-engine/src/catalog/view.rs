//! Filter, search and sort projection over a catalog.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::str::FromStr;

use super::{Catalog, CatalogItem, ItemKind};
use crate::config::ToolMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    #[default]
    All,
    /// Lua items in SteamTools mode, GreenLuma items in GreenLuma mode.
    Overrides,
    SteamGames,
}

impl Filter {
    /// Every filter, in display order.
    #[must_use]
    pub fn options() -> [Self; 3] {
        [Self::All, Self::Overrides, Self::SteamGames]
    }

    #[must_use]
    pub fn label(self, mode: ToolMode) -> &'static str {
        match (self, mode) {
            (Self::All, _) => "All",
            (Self::Overrides, ToolMode::SteamTools) => "Lua Only",
            (Self::Overrides, ToolMode::GreenLuma) => "GreenLuma Only",
            (Self::SteamGames, _) => "Steam Games Only",
        }
    }

    /// Labels shown for `mode`.
    #[must_use]
    pub fn labels(mode: ToolMode) -> Vec<&'static str> {
        Self::options().iter().map(|f| f.label(mode)).collect()
    }

    fn admits(self, kind: ItemKind) -> bool {
        match self {
            Self::All => true,
            Self::Overrides => kind.is_override(),
            Self::SteamGames => kind == ItemKind::SteamGame,
        }
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "lua" | "greenluma" | "overrides" => Ok(Self::Overrides),
            "steam" | "steam-games" => Ok(Self::SteamGames),
            other => Err(format!(
                "unknown filter '{other}' (expected all, lua, greenluma or steam)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Ascending, case-insensitive.
    #[default]
    Name,
    /// Largest first.
    Size,
    /// Newest first.
    Installed,
    /// Newest first.
    Updated,
}

impl SortKey {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Size => "Size",
            Self::Installed => "Install Date",
            Self::Updated => "Last Updated",
        }
    }

    fn compare(self, a: &CatalogItem, b: &CatalogItem) -> Ordering {
        match self {
            Self::Name => compare_names(a, b),
            Self::Size => b.size_bytes.cmp(&a.size_bytes),
            Self::Installed => newest_first(a.installed_at, b.installed_at),
            Self::Updated => newest_first(a.last_updated, b.last_updated),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "size" => Ok(Self::Size),
            "installed" | "install-date" => Ok(Self::Installed),
            "updated" | "last-updated" => Ok(Self::Updated),
            other => Err(format!(
                "unknown sort '{other}' (expected name, size, installed or updated)"
            )),
        }
    }
}

fn compare_names(a: &CatalogItem, b: &CatalogItem) -> Ordering {
    match (a.name.is_empty(), b.name.is_empty()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.app_id.cmp(&b.app_id)),
    }
}

fn newest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Filter, search text and sort key of the visible list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub filter: Filter,
    pub search: String,
    pub sort: SortKey,
}

impl ViewQuery {
    fn matches(&self, needle: &str, item: &CatalogItem) -> bool {
        if !self.filter.admits(item.kind) {
            return false;
        }
        needle.is_empty()
            || item.name.to_lowercase().contains(needle)
            || item.app_id.to_lowercase().contains(needle)
            || item.description.to_lowercase().contains(needle)
    }
}

/// Indices of the visible items of `catalog`, in display order.
#[must_use]
pub fn project(catalog: &Catalog, query: &ViewQuery) -> Vec<usize> {
    let needle = query.search.trim().to_lowercase();
    let items = catalog.items();
    let mut visible: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| query.matches(&needle, item))
        .map(|(index, _)| index)
        .collect();
    visible.sort_by(|&a, &b| query.sort.compare(&items[a], &items[b]));
    visible
}
