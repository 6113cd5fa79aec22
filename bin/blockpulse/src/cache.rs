//! Endpoint-list cache over the registry's read API.
//!
//! The registry is fetched at most once per `max_age`; a failed refresh
//! falls back to the previous list so the polling loop rides out registry
//! outages. An optional JSON mirror file carries the cache across restarts.

use crate::endpoint::{ApiClass, Endpoint, has_supported_scheme};
use eyre::WrapErr;
use jiff::Timestamp;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

/// One chain record as the registry's `/all` route returns it.
#[derive(Debug, Deserialize)]
struct ChainRecord {
    chain_name: String,
    api_class: String,
    urls: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    entries: Vec<Endpoint>,
    fetched_at: Timestamp,
}

/// Cached endpoint list with bounded staleness.
///
/// Replaced wholesale on successful refresh, returned unchanged on a failed
/// one (stale-but-available), never partially updated.
pub struct EndpointCache {
    client: reqwest::Client,
    registry_url: Url,
    max_age: Duration,
    mirror: Option<PathBuf>,
    entries: Option<Vec<Endpoint>>,
    fetched_at: Option<Timestamp>,
}

impl EndpointCache {
    pub fn new(
        client: reqwest::Client,
        registry_url: Url,
        max_age: Duration,
        mirror: Option<PathBuf>,
    ) -> Self {
        let mut cache = Self {
            client,
            registry_url,
            max_age,
            mirror,
            entries: None,
            fetched_at: None,
        };
        cache.restore_mirror();
        cache
    }

    fn is_fresh(&self) -> bool {
        match self.fetched_at {
            Some(at) => {
                let age_secs = Timestamp::now().as_second() - at.as_second();
                age_secs >= 0 && (age_secs as u64) <= self.max_age.as_secs()
            }
            None => false,
        }
    }

    /// Current endpoint list, refreshing from the registry when the cache is
    /// empty or older than `max_age`.
    ///
    /// On refresh failure the previous list is returned unchanged when one
    /// exists; with no previous list the error propagates, which callers
    /// treat as fatal for the round only.
    pub async fn load(&mut self) -> eyre::Result<Vec<Endpoint>> {
        if self.is_fresh() {
            if let Some(entries) = &self.entries {
                debug!("using cached endpoints");
                return Ok(entries.clone());
            }
        }

        match self.refresh().await {
            Ok(entries) => {
                info!(endpoints = entries.len(), "refreshed endpoint list from registry");
                self.entries = Some(entries.clone());
                self.fetched_at = Some(Timestamp::now());
                self.write_mirror();
                Ok(entries)
            }
            Err(err) => {
                counter!("blockpulse_registry_refresh_failures").increment(1);
                match &self.entries {
                    Some(previous) => {
                        warn!(err = %err, "registry refresh failed, using previous endpoint list");
                        Ok(previous.clone())
                    }
                    None => {
                        Err(err).wrap_err("registry refresh failed with no cached endpoint list")
                    }
                }
            }
        }
    }

    async fn refresh(&self) -> eyre::Result<Vec<Endpoint>> {
        let url = format!("{}/all", self.registry_url.as_str().trim_end_matches('/'));
        let records: Vec<ChainRecord> = self
            .client
            .get(&url)
            .timeout(REGISTRY_TIMEOUT)
            .send()
            .await
            .wrap_err("failed to reach the endpoint registry")?
            .error_for_status()
            .wrap_err("registry returned an error status")?
            .json()
            .await
            .wrap_err("failed to decode registry response")?;
        Ok(normalize(records))
    }

    fn restore_mirror(&mut self) {
        let Some(path) = &self.mirror else { return };
        let file = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<CacheFile>(&raw) {
                Ok(file) => file,
                Err(err) => {
                    warn!(path = %path.display(), err = %err, "could not parse cache file");
                    return;
                }
            },
            // a missing mirror on first start is normal
            Err(err) => {
                debug!(path = %path.display(), err = %err, "no cache file to restore");
                return;
            }
        };
        info!(
            path = %path.display(),
            endpoints = file.entries.len(),
            "restored endpoint cache from file"
        );
        self.entries = Some(file.entries);
        self.fetched_at = Some(file.fetched_at);
    }

    fn write_mirror(&self) {
        let (Some(path), Some(entries), Some(fetched_at)) =
            (&self.mirror, &self.entries, self.fetched_at)
        else {
            return;
        };
        let file = CacheFile {
            entries: entries.clone(),
            fetched_at,
        };
        let outcome = serde_json::to_string(&file)
            .map_err(|e| e.to_string())
            .and_then(|raw| fs::write(path, raw).map_err(|e| e.to_string()));
        if let Err(err) = outcome {
            // mirroring is best-effort, the in-memory cache stays authoritative
            warn!(path = %path.display(), err = %err, "could not write cache file");
        }
    }
}

/// Flatten registry records into endpoints, dropping entries this poller
/// cannot probe.
fn normalize(records: Vec<ChainRecord>) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();
    for record in records {
        let api_class = match record.api_class.parse::<ApiClass>() {
            Ok(class) => class,
            Err(err) => {
                warn!(chain = %record.chain_name, err = %err, "skipping chain");
                continue;
            }
        };
        for raw in record.urls {
            match raw.parse::<Url>() {
                Ok(url) if has_supported_scheme(&url) => endpoints.push(Endpoint {
                    chain: record.chain_name.clone(),
                    url,
                    api_class,
                }),
                Ok(url) => warn!(%url, "skipping endpoint with unsupported scheme"),
                Err(err) => warn!(url = %raw, err = %err, "skipping unparseable endpoint url"),
            }
        }
    }
    endpoints
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn registry_body() -> serde_json::Value {
        serde_json::json!([
            {
                "chain_name": "Ethereum",
                "api_class": "ethereum",
                "urls": ["https://eth.example", "https://eth2.example"],
            },
            {
                "chain_name": "Polkadot",
                "api_class": "substrate",
                "urls": ["wss://dot.example"],
            },
        ])
    }

    fn cache_for(server: &MockServer, max_age: Duration, mirror: Option<PathBuf>) -> EndpointCache {
        EndpointCache::new(
            reqwest::Client::new(),
            server.base_url().parse().unwrap(),
            max_age,
            mirror,
        )
    }

    #[tokio::test]
    async fn fresh_cache_performs_no_second_fetch() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/all");
            then.status(200).json_body(registry_body());
        });

        let mut cache = cache_for(&server, Duration::from_secs(3600), None);
        let first = cache.load().await.unwrap();
        let second = cache.load().await.unwrap();

        mock.assert_hits(1);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_previous_list() {
        let server = MockServer::start();
        let mut ok = server.mock(|when, then| {
            when.method(GET).path("/all");
            then.status(200).json_body(registry_body());
        });

        // max_age zero forces a refresh attempt on every load
        let mut cache = cache_for(&server, Duration::from_secs(0), None);
        let first = cache.load().await.unwrap();

        ok.delete();
        server.mock(|when, then| {
            when.method(GET).path("/all");
            then.status(500);
        });

        // tick past the zero max-age so the second load is stale
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let second = cache.load().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failed_refresh_with_no_cache_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/all");
            then.status(500);
        });

        let mut cache = cache_for(&server, Duration::from_secs(60), None);
        assert!(cache.load().await.is_err());
    }

    #[tokio::test]
    async fn unknown_classes_and_bad_urls_are_dropped() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/all");
            then.status(200).json_body(serde_json::json!([
                {"chain_name": "Ethereum", "api_class": "ethereum", "urls": ["https://eth.example"]},
                {"chain_name": "Cosmos", "api_class": "cosmos", "urls": ["https://atom.example"]},
                {"chain_name": "Odd", "api_class": "ethereum", "urls": ["ftp://odd.example", "::not a url::"]},
            ]));
        });

        let mut cache = cache_for(&server, Duration::from_secs(60), None);
        let entries = cache.load().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chain, "Ethereum");
    }

    #[tokio::test]
    async fn mirror_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = dir.path().join("cache.json");

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/all");
            then.status(200).json_body(registry_body());
        });

        let mut cache = cache_for(&server, Duration::from_secs(3600), Some(mirror.clone()));
        let first = cache.load().await.unwrap();
        mock.assert_hits(1);

        // a fresh process restores the mirror and needs no fetch at all
        let mut restarted = cache_for(&server, Duration::from_secs(3600), Some(mirror));
        let second = restarted.load().await.unwrap();
        mock.assert_hits(1);
        assert_eq!(first, second);
    }
}
