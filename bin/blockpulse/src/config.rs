//! Poller configuration file parsing.

use eyre::{WrapErr, bail};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Root configuration, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the endpoint registry's read API.
    pub registry_url: Url,
    /// Metrics store connection settings.
    pub influx: InfluxSettings,
    /// Per-request probe timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum endpoint-list age before a registry refresh, in seconds.
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,
    /// Sleep between polling rounds, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Optional JSON file mirroring the endpoint cache across restarts.
    #[serde(default)]
    pub cache_file: Option<PathBuf>,
}

/// InfluxDB v2 connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxSettings {
    pub url: Url,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_cache_max_age_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    10
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<std::path::Path>) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path).wrap_err("failed to read config file")?;
        let config: Self = toml::from_str(&content).wrap_err("failed to parse config file")?;

        if config.influx.token.is_empty() {
            bail!("influx.token must not be empty");
        }
        if config.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let file = write_config(
            r#"
            registry_url = "http://registry.example:5000"

            [influx]
            url = "http://influx.example:8086"
            token = "secret"
            org = "dwellir"
            bucket = "blockheights"
            "#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.cache_max_age_secs, 60);
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.cache_file, None);
        assert_eq!(config.influx.bucket, "blockheights");
    }

    #[test]
    fn overrides_are_honored() {
        let file = write_config(
            r#"
            registry_url = "http://registry.example:5000"
            request_timeout_secs = 3
            cache_max_age_secs = 120
            poll_interval_secs = 30
            cache_file = "/var/lib/blockpulse/cache.json"

            [influx]
            url = "http://influx.example:8086"
            token = "secret"
            org = "dwellir"
            bucket = "blockheights"
            "#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.cache_max_age(), Duration::from_secs(120));
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert!(config.cache_file.is_some());
    }

    #[test]
    fn empty_token_is_rejected() {
        let file = write_config(
            r#"
            registry_url = "http://registry.example:5000"

            [influx]
            url = "http://influx.example:8086"
            token = ""
            org = "dwellir"
            bucket = "blockheights"
            "#,
        );

        assert!(Config::load(file.path()).is_err());
    }
}
