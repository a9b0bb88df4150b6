//! Background icon enrichment.
//!
//! Lookups run on a [`JoinSet`] gated by a [`Semaphore`]; each resolved icon
//! is sent to the coordinator as an [`IconUpdate`] instead of being written
//! into the catalog directly. Aborting the returned handle aborts every
//! lookup still running.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::{Catalog, ItemKind};
use crate::services::{IconCache, NativePlatform};

/// A resolved icon for one item of catalog `generation`.
#[derive(Debug, Clone, PartialEq)]
pub struct IconUpdate {
    pub generation: u64,
    pub kind: ItemKind,
    pub app_id: String,
    pub path: PathBuf,
}

/// One icon lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct IconRequest {
    pub kind: ItemKind,
    pub app_id: String,
    pub name: String,
    pub local_hint: Option<PathBuf>,
    pub remote_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub requested: usize,
    pub resolved: usize,
    pub missing: usize,
    /// Lookups that panicked or were aborted.
    pub failed: usize,
}

enum Outcome {
    Resolved,
    Missing,
}

/// Lookups for every item still lacking an icon. Steam games also offer the
/// client's own library cache as a local source.
pub fn requests(catalog: &Catalog, platform: &dyn NativePlatform) -> Vec<IconRequest> {
    catalog
        .items()
        .iter()
        .filter(|item| item.icon_path.is_none())
        .map(|item| IconRequest {
            kind: item.kind,
            app_id: item.app_id.clone(),
            name: item.name.clone(),
            local_hint: match item.kind {
                ItemKind::SteamGame => platform.local_icon(&item.app_id),
                ItemKind::Lua | ItemKind::GreenLuma => None,
            },
            remote_hint: item.icon_url.clone(),
        })
        .collect()
}

/// Resolve `requests` with at most `limit` lookups in flight.
pub async fn enrich(
    icons: Arc<dyn IconCache>,
    generation: u64,
    requests: Vec<IconRequest>,
    limit: usize,
    updates: mpsc::UnboundedSender<IconUpdate>,
) -> EnrichmentSummary {
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();
    let mut summary = EnrichmentSummary {
        requested: requests.len(),
        ..Default::default()
    };

    for request in requests {
        let permits = Arc::clone(&permits);
        let icons = Arc::clone(&icons);
        let updates = updates.clone();
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return Outcome::Missing;
            };
            match icons
                .icon_path(&request.app_id, request.local_hint, request.remote_hint)
                .await
            {
                Some(path) => {
                    debug!("Icon loaded for {} ({})", request.name, request.app_id);
                    let update = IconUpdate {
                        generation,
                        kind: request.kind,
                        app_id: request.app_id,
                        path,
                    };
                    if updates.send(update).is_err() {
                        debug!("Catalog {} dropped before its icons arrived", generation);
                    }
                    Outcome::Resolved
                }
                None => {
                    warn!("No icon found for {} ({})", request.name, request.app_id);
                    Outcome::Missing
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Outcome::Resolved) => summary.resolved += 1,
            Ok(Outcome::Missing) => summary.missing += 1,
            Err(e) => {
                warn!("Icon lookup task failed: {}", e);
                summary.failed += 1;
            }
        }
    }

    info!(
        "Enrichment of catalog {} done: {}/{} icon(s) resolved",
        generation, summary.resolved, summary.requested
    );
    summary
}

/// Run [`enrich`] as a background task.
pub fn spawn(
    icons: Arc<dyn IconCache>,
    generation: u64,
    requests: Vec<IconRequest>,
    limit: usize,
    updates: mpsc::UnboundedSender<IconUpdate>,
) -> JoinHandle<EnrichmentSummary> {
    tokio::spawn(enrich(icons, generation, requests, limit, updates))
}
