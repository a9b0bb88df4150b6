//! Depot candidates for a GreenLuma install.
//!
//! The lua file shipped in the archive names the depots and their sizes;
//! SteamCMD's public info API adds the language each depot carries.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::lua::LuaSyntax;
use super::{DepotInfo, RemoteMemberInfo};
use crate::error::{LibraryError, Result};

const DEPOT_INFO_URL: &str = "https://api.steamcmd.net/v1/info";

/// Remote depot metadata worth merging.
#[derive(Debug, Clone, Default, PartialEq)]
struct RemoteDepot {
    name: Option<String>,
    language: Option<String>,
}

#[derive(Debug)]
pub struct DepotInfoClient {
    http: reqwest::Client,
    base_url: String,
    syntax: LuaSyntax,
}

impl DepotInfoClient {
    pub fn new(http: reqwest::Client) -> Result<Self> {
        Self::with_endpoint(http, DEPOT_INFO_URL)
    }

    pub fn with_endpoint(http: reqwest::Client, base_url: &str) -> Result<Self> {
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            syntax: LuaSyntax::compile()?,
        })
    }

    async fn remote_depots(&self, app_id: &str) -> Result<HashMap<String, RemoteDepot>> {
        let url = format!("{}/{}", self.base_url, app_id);
        let remote = |source| LibraryError::Remote {
            url: url.clone(),
            source,
        };
        let body: Value = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(remote)?
            .json()
            .await
            .map_err(remote)?;
        Ok(parse_remote_depots(&body, app_id))
    }

    /// Merge lua-declared depots with remote metadata. The main app is never a candidate.
    fn combine(
        &self,
        app_id: &str,
        lua_content: &str,
        remote: &HashMap<String, RemoteDepot>,
    ) -> Vec<DepotInfo> {
        self.syntax
            .depots(lua_content)
            .into_iter()
            .filter(|depot| depot.depot_id != app_id)
            .map(|depot| {
                let extra = remote.get(&depot.depot_id);
                let base = depot
                    .comment
                    .or_else(|| extra.and_then(|r| r.name.clone()))
                    .unwrap_or_else(|| format!("Depot {}", depot.depot_id));
                let name = match extra.and_then(|r| r.language.as_deref()) {
                    Some(language) if !base.to_lowercase().contains(language) => {
                        format!("{base} [{language}]")
                    }
                    _ => base,
                };
                DepotInfo {
                    depot_id: depot.depot_id,
                    name,
                    size_bytes: depot.size_bytes.unwrap_or(0),
                }
            })
            .collect()
    }
}

/// Read `data.<appid>.depots.<depot>.{name, config.language}`.
fn parse_remote_depots(body: &Value, app_id: &str) -> HashMap<String, RemoteDepot> {
    let Some(depots) = body
        .pointer(&format!("/data/{app_id}/depots"))
        .and_then(Value::as_object)
    else {
        return HashMap::new();
    };

    depots
        .iter()
        .filter(|(id, _)| id.chars().all(|c| c.is_ascii_digit()))
        .map(|(id, depot)| {
            let text = |pointer: &str| {
                depot
                    .pointer(pointer)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };
            (
                id.clone(),
                RemoteDepot {
                    name: text("/name"),
                    language: text("/config/language"),
                },
            )
        })
        .collect()
}

#[async_trait]
impl RemoteMemberInfo for DepotInfoClient {
    async fn combined_depots(&self, app_id: &str, lua_content: Option<&str>) -> Vec<DepotInfo> {
        let Some(lua_content) = lua_content else {
            debug!("No lua content for {}, no depots to offer", app_id);
            return Vec::new();
        };
        let remote = match self.remote_depots(app_id).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!("Depot lookup for {} failed, using lua data only: {}", app_id, e);
                HashMap::new()
            }
        };
        self.combine(app_id, lua_content, &remote)
    }
}
