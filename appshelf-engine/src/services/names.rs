//! The public Steam app list, cached on disk for a week.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{AppNames, NameIndex};
use crate::error::{LibraryError, Result};

const APP_LIST_URL: &str = "https://api.steampowered.com/ISteamApps/GetAppList/v2/";
const CACHE_DAYS: i64 = 7;

/// HTTP client shared by the network collaborators.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("appshelf/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|source| LibraryError::Remote {
            url: "client".to_string(),
            source,
        })
}

#[derive(Debug, Deserialize)]
struct AppListResponse {
    applist: AppListBody,
}

#[derive(Debug, Deserialize)]
struct AppListBody {
    apps: Vec<AppRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AppRecord {
    appid: u64,
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedAppList {
    fetched_at: DateTime<Utc>,
    apps: Vec<AppRecord>,
}

impl CachedAppList {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < Duration::days(CACHE_DAYS)
    }

    fn to_names(&self) -> AppNames {
        self.apps
            .iter()
            .filter(|app| !app.name.trim().is_empty())
            .map(|app| (app.appid.to_string(), app.name.clone()))
            .collect()
    }
}

/// [`NameIndex`] backed by the Steam Web API.
#[derive(Debug)]
pub struct SteamAppList {
    cache_path: PathBuf,
    url: String,
    http: reqwest::Client,
    snapshot: Mutex<Option<Arc<AppNames>>>,
}

impl SteamAppList {
    pub fn new(cache_path: PathBuf, http: reqwest::Client) -> Self {
        Self::with_endpoint(cache_path, http, APP_LIST_URL)
    }

    pub fn with_endpoint(cache_path: PathBuf, http: reqwest::Client, url: &str) -> Self {
        Self {
            cache_path,
            url: url.to_string(),
            http,
            snapshot: Mutex::new(None),
        }
    }

    async fn read_cache(&self) -> Option<CachedAppList> {
        let content = tokio::fs::read_to_string(&self.cache_path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!("Ignoring corrupt app list cache {}: {}", self.cache_path.display(), e);
                None
            }
        }
    }

    async fn fetch(&self) -> Result<CachedAppList> {
        let remote = |source| LibraryError::Remote {
            url: self.url.clone(),
            source,
        };
        let response: AppListResponse = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(remote)?
            .json()
            .await
            .map_err(remote)?;

        let cached = CachedAppList {
            fetched_at: Utc::now(),
            apps: response.applist.apps,
        };
        let json = serde_json::to_string(&cached)?;
        if let Err(e) = tokio::fs::write(&self.cache_path, json).await {
            warn!("Failed to cache app list at {}: {}", self.cache_path.display(), e);
        }
        info!("Fetched {} app names", cached.apps.len());
        Ok(cached)
    }
}

#[async_trait]
impl NameIndex for SteamAppList {
    async fn app_names(&self) -> Result<Arc<AppNames>> {
        let mut snapshot = self.snapshot.lock().await;
        if let Some(names) = snapshot.as_ref() {
            return Ok(Arc::clone(names));
        }

        let cached = self.read_cache().await;
        let list = match cached {
            Some(cached) if cached.is_fresh(Utc::now()) => {
                debug!("Using cached app list from {}", cached.fetched_at);
                cached
            }
            stale => match self.fetch().await {
                Ok(fresh) => fresh,
                Err(e) => match stale {
                    Some(stale) => {
                        warn!("App list refresh failed, using stale cache: {}", e);
                        stale
                    }
                    None => return Err(e),
                },
            },
        };

        let names = Arc::new(list.to_names());
        *snapshot = Some(Arc::clone(&names));
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const UNREACHABLE: &str = "http://127.0.0.1:9/applist";

    fn write_cache(path: &std::path::Path, fetched_at: DateTime<Utc>) {
        let cached = CachedAppList {
            fetched_at,
            apps: vec![
                AppRecord {
                    appid: 570,
                    name: "Dota 2".to_string(),
                },
                AppRecord {
                    appid: 1,
                    name: " ".to_string(),
                },
            ],
        };
        let json = match serde_json::to_string(&cached) {
            Ok(json) => json,
            Err(e) => panic!("Failed to encode cache: {e}"),
        };
        if let Err(e) = std::fs::write(path, json) {
            panic!("Failed to write cache: {e}");
        }
    }

    #[test]
    fn test_freshness_window() {
        let now = Utc::now();
        let cached = CachedAppList {
            fetched_at: now - Duration::days(6),
            apps: Vec::new(),
        };
        assert!(cached.is_fresh(now));
        let stale = CachedAppList {
            fetched_at: now - Duration::days(8),
            apps: Vec::new(),
        };
        assert!(!stale.is_fresh(now));
    }

    #[test]
    fn test_parse_api_response() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let body = r#"{"applist":{"apps":[{"appid":570,"name":"Dota 2"},{"appid":730,"name":"Counter-Strike 2"}]}}"#;
        let response: AppListResponse = serde_json::from_str(body)?;
        assert_eq!(response.applist.apps.len(), 2);
        assert_eq!(response.applist.apps[1].appid, 730);
        Ok(())
    }

    #[tokio::test]
    async fn test_fresh_cache_is_used() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let cache = temp.path().join("applist.json");
        write_cache(&cache, Utc::now());

        let index = SteamAppList::with_endpoint(cache, http_client()?, UNREACHABLE);
        let names = index.app_names().await?;
        assert_eq!(names.lookup("570"), Some("Dota 2"));
        assert_eq!(names.lookup("1"), None);
        assert_eq!(index.name_of("570").await.as_deref(), Some("Dota 2"));
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_cache_survives_failed_refresh()
    -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let cache = temp.path().join("applist.json");
        write_cache(&cache, Utc::now() - Duration::days(30));

        let index = SteamAppList::with_endpoint(cache, http_client()?, UNREACHABLE);
        let names = index.app_names().await?;
        assert_eq!(names.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_cache_and_no_network_fails() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let temp = TempDir::new()?;
        let index = SteamAppList::with_endpoint(
            temp.path().join("applist.json"),
            http_client()?,
            UNREACHABLE,
        );
        assert!(index.app_names().await.is_err());
        assert_eq!(index.name_of("570").await, None);
        Ok(())
    }
}
