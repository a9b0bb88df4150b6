//! The library coordinator.
//!
//! [`Library`] owns the catalog and everything derived from it: the view
//! query, the projected list, selection and the background enrichment task.
//! All mutation goes through its methods (or [`Library::dispatch`]); every
//! change bumps a revision on a `watch` channel so a renderer knows to redraw.

use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::catalog::enrich::{self, EnrichmentSummary, IconUpdate};
use crate::catalog::view::{self, Filter, SortKey, ViewQuery};
use crate::catalog::{Catalog, CatalogItem, builder};
use crate::config::{Settings, ToolMode};
use crate::error::{LibraryError, Result};
use crate::services::{PatchOutcome, Services};
use crate::storage::ShelfStorage;
use crate::workflow;

/// Render a byte count with a 1024 base, e.g. `1.5 GB`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

/// A user action against the library.
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryCommand {
    Refresh,
    SetFilter(Filter),
    SetSearch(String),
    SetSort(SortKey),
    ToggleSelectMode,
    /// Select or deselect the item at a position of the visible list.
    Select { position: usize, selected: bool },
    SelectAll,
    DeselectAll,
    Uninstall { app_id: String },
    UninstallSelected,
    PatchAll,
    Enable { app_id: String },
    Disable { app_id: String },
    DeleteLua { app_id: String },
    Import { paths: Vec<PathBuf> },
}

/// What a command did, for the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub message: String,
}

impl CommandOutcome {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub struct Library {
    services: Services,
    storage: ShelfStorage,
    settings: Settings,
    catalog: Catalog,
    query: ViewQuery,
    visible: Vec<usize>,
    select_mode: bool,
    status: String,
    generation: u64,
    enrichment: Option<JoinHandle<EnrichmentSummary>>,
    icon_tx: mpsc::UnboundedSender<IconUpdate>,
    icon_rx: mpsc::UnboundedReceiver<IconUpdate>,
    revision: watch::Sender<u64>,
}

impl Library {
    pub fn new(services: Services, storage: ShelfStorage, settings: Settings) -> Self {
        let (icon_tx, icon_rx) = mpsc::unbounded_channel();
        Self {
            services,
            storage,
            settings,
            catalog: Catalog::default(),
            query: ViewQuery::default(),
            visible: Vec::new(),
            select_mode: false,
            status: "No items".to_string(),
            generation: 0,
            enrichment: None,
            icon_tx,
            icon_rx,
            revision: watch::channel(0).0,
        }
    }

    /// Revision counter, bumped on every observable change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    pub fn mode(&self) -> ToolMode {
        self.settings.mode
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn query(&self) -> &ViewQuery {
        &self.query
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_select_mode(&self) -> bool {
        self.select_mode
    }

    pub fn filter_labels(&self) -> Vec<&'static str> {
        Filter::labels(self.mode())
    }

    /// Visible items in display order.
    pub fn visible_items(&self) -> Vec<&CatalogItem> {
        self.visible
            .iter()
            .filter_map(|&index| self.catalog.items().get(index))
            .collect()
    }

    fn reproject(&mut self) {
        self.visible = view::project(&self.catalog, &self.query);
        self.status = format!(
            "{} of {} item(s)",
            self.visible.len(),
            self.catalog.len()
        );
        self.notify();
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.query.filter = filter;
        self.reproject();
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.query.search = search.into();
        self.reproject();
    }

    pub fn set_sort(&mut self, sort: SortKey) {
        self.query.sort = sort;
        self.reproject();
    }

    /// Rebuild the catalog and start enriching it.
    ///
    /// An enrichment still running for the previous catalog is aborted, and
    /// any of its results still queued are discarded by generation.
    pub async fn refresh(&mut self) -> Result<()> {
        if let Some(previous) = self.enrichment.take() {
            previous.abort();
        }
        self.generation += 1;
        self.status = "Loading library...".to_string();
        self.notify();

        let ledger = self.storage.load_ledger().unwrap_or_else(|e| {
            warn!("Install ledger unreadable, GreenLuma names may be missing: {}", e);
            Default::default()
        });
        let built = builder::build(&self.services, &ledger, self.settings.mode, self.generation).await;
        let catalog = match built {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("Library refresh failed: {}", e);
                self.status = format!("Error loading library: {e}");
                self.notify();
                return Err(e);
            }
        };

        let requests = enrich::requests(&catalog, self.services.platform.as_ref());
        self.catalog = catalog;
        self.select_mode = false;
        self.reproject();
        if self.catalog.stats().steam_games == 0 {
            self.status = "No Steam games found. Check Steam installation.".to_string();
        } else {
            self.status = format!("{} item(s) loaded", self.catalog.len());
        }

        self.enrichment = Some(enrich::spawn(
            self.services.icons.clone(),
            self.generation,
            requests,
            self.settings.icon_concurrency,
            self.icon_tx.clone(),
        ));
        Ok(())
    }

    /// Write queued icon results into the current catalog. Returns how many applied.
    pub fn apply_icon_updates(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.icon_rx.try_recv() {
            if update.generation != self.catalog.generation() {
                continue;
            }
            if self
                .catalog
                .apply_icon(update.kind, &update.app_id, update.path)
            {
                applied += 1;
            }
        }
        if applied > 0 {
            self.notify();
        }
        applied
    }

    /// Wait for the running enrichment, then apply its results.
    pub async fn finish_enrichment(&mut self) -> Option<EnrichmentSummary> {
        let handle = self.enrichment.take()?;
        let summary = match handle.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Enrichment task ended early: {}", e);
                None
            }
        };
        self.apply_icon_updates();
        summary
    }

    pub fn toggle_select_mode(&mut self) {
        self.select_mode = !self.select_mode;
        if !self.select_mode {
            self.catalog.clear_selection();
        }
        self.notify();
    }

    /// Select the item at `position` in the visible list.
    pub fn select(&mut self, position: usize, selected: bool) -> bool {
        let Some(&index) = self.visible.get(position) else {
            return false;
        };
        let changed = self.catalog.set_selected(index, selected);
        self.notify();
        changed
    }

    fn select_visible(&mut self, selected: bool) {
        for &index in &self.visible {
            self.catalog.set_selected(index, selected);
        }
        self.notify();
    }

    pub fn select_all(&mut self) {
        self.select_visible(true);
    }

    pub fn deselect_all(&mut self) {
        self.select_visible(false);
    }

    /// Uninstall the catalog item for `app_id`, preferring lua and GreenLuma items.
    pub async fn uninstall(&mut self, app_id: &str) -> Result<String> {
        let item = self
            .catalog
            .find(app_id)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound {
                app_id: app_id.to_string(),
            })?;
        workflow::uninstall(&self.services, &self.storage, &item)?;
        let message = format!("{} uninstalled successfully", item.name);
        self.refresh().await?;
        Ok(message)
    }

    /// Uninstall every selected visible item. Returns how many succeeded.
    pub async fn uninstall_selected(&mut self) -> Result<usize> {
        let selected: Vec<CatalogItem> = self
            .visible_items()
            .into_iter()
            .filter(|item| item.selected)
            .cloned()
            .collect();
        if selected.is_empty() {
            return Ok(0);
        }
        let succeeded = workflow::uninstall_batch(&self.services, &self.storage, &selected);
        self.refresh().await?;
        Ok(succeeded)
    }

    /// Patch every lua descriptor. Returns how many changed.
    pub async fn patch_all(&mut self) -> Result<usize> {
        let mut patched = 0;
        for entry in self.services.descriptors.enumerate()? {
            match self.services.descriptors.patch(&entry.app_id) {
                Ok(PatchOutcome::Patched) => patched += 1,
                Ok(PatchOutcome::AlreadyPatched) => {}
                Err(e) => warn!("Failed to patch {}: {}", entry.path.display(), e),
            }
        }
        info!("Patched {} lua file(s)", patched);
        self.refresh().await?;
        Ok(patched)
    }

    async fn lua_action(&mut self, action: Result<String>) -> Result<String> {
        let message = action?;
        self.refresh().await?;
        Ok(message)
    }

    pub async fn enable(&mut self, app_id: &str) -> Result<String> {
        let action = self.services.descriptors.enable(app_id);
        self.lua_action(action).await
    }

    pub async fn disable(&mut self, app_id: &str) -> Result<String> {
        let action = self.services.descriptors.disable(app_id);
        self.lua_action(action).await
    }

    pub async fn delete_lua(&mut self, app_id: &str) -> Result<String> {
        let action = self.services.descriptors.delete(app_id);
        self.lua_action(action).await
    }

    /// Import dropped `.lua` and `.zip` files into the lua folder.
    pub async fn import(&mut self, paths: &[PathBuf]) -> Result<usize> {
        let copied = self.services.descriptors.import(paths)?;
        if copied > 0 {
            self.refresh().await?;
        }
        Ok(copied)
    }

    /// Per-kind counts and total size, e.g. `Lua: 3 | Steam Games: 12 | Total Size: 1.5 GB`.
    pub fn statistics_summary(&self) -> String {
        let stats = self.catalog.stats();
        let overrides = match self.mode() {
            ToolMode::SteamTools => format!("Lua: {}", stats.lua),
            ToolMode::GreenLuma => format!("GreenLuma: {}", stats.greenluma),
        };
        format!(
            "{} | Steam Games: {} | Total Size: {}",
            overrides,
            stats.steam_games,
            format_bytes(stats.total_size)
        )
    }

    /// Run one command.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying operation; the library state is
    /// left as it was before the failing step.
    pub async fn dispatch(&mut self, command: LibraryCommand) -> Result<CommandOutcome> {
        let outcome = match command {
            LibraryCommand::Refresh => {
                self.refresh().await?;
                CommandOutcome::new(self.status.clone())
            }
            LibraryCommand::SetFilter(filter) => {
                self.set_filter(filter);
                CommandOutcome::new(self.status.clone())
            }
            LibraryCommand::SetSearch(search) => {
                self.set_search(search);
                CommandOutcome::new(self.status.clone())
            }
            LibraryCommand::SetSort(sort) => {
                self.set_sort(sort);
                CommandOutcome::new(self.status.clone())
            }
            LibraryCommand::ToggleSelectMode => {
                self.toggle_select_mode();
                CommandOutcome::new(if self.select_mode {
                    "Select mode on"
                } else {
                    "Select mode off"
                })
            }
            LibraryCommand::Select { position, selected } => {
                if !self.select(position, selected) {
                    return Err(LibraryError::NotFound {
                        app_id: format!("#{position}"),
                    });
                }
                CommandOutcome::new(format!("{} selected", self.catalog.selected().len()))
            }
            LibraryCommand::SelectAll => {
                self.select_all();
                CommandOutcome::new(format!("{} selected", self.catalog.selected().len()))
            }
            LibraryCommand::DeselectAll => {
                self.deselect_all();
                CommandOutcome::new("Selection cleared")
            }
            LibraryCommand::Uninstall { app_id } => CommandOutcome::new(self.uninstall(&app_id).await?),
            LibraryCommand::UninstallSelected => {
                let any_selected = self.visible_items().iter().any(|item| item.selected);
                let count = self.uninstall_selected().await?;
                if !any_selected {
                    CommandOutcome::new("No items selected")
                } else {
                    CommandOutcome::new(format!("{count} item(s) uninstalled successfully"))
                }
            }
            LibraryCommand::PatchAll => {
                let patched = self.patch_all().await?;
                CommandOutcome::new(format!(
                    "Patched {patched} file(s). Restart Steam for changes to take effect."
                ))
            }
            LibraryCommand::Enable { app_id } => CommandOutcome::new(self.enable(&app_id).await?),
            LibraryCommand::Disable { app_id } => CommandOutcome::new(self.disable(&app_id).await?),
            LibraryCommand::DeleteLua { app_id } => {
                CommandOutcome::new(self.delete_lua(&app_id).await?)
            }
            LibraryCommand::Import { paths } => {
                let copied = self.import(&paths).await?;
                if copied == 0 {
                    CommandOutcome::new("No valid .lua files found")
                } else {
                    CommandOutcome::new(format!(
                        "Successfully added {copied} file(s)! Restart Steam for changes to take effect."
                    ))
                }
            }
        };
        Ok(outcome)
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        if let Some(handle) = self.enrichment.take() {
            handle.abort();
        }
    }
}
