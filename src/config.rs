//! Notifier configuration, loaded from a JSON file and environment variables.
//!
//! Every backend is optional; an unset URL or host leaves the matching sink
//! disabled rather than failing.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CLIENT_TTL_SECS, DEFAULT_GITHUB_API_URL, DEFAULT_REFERER,
    DEFAULT_STATSD_MAX_PACKET_BYTES, DEFAULT_STATSD_PORT, DEFAULT_STATSD_PREFIX,
};
use crate::error::{NotifyError, Result};
use crate::line_protocol::SchemaVersion;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Master switch for commit statuses.
    pub enabled: bool,
    pub api_url: String,
    /// Token sent as a bearer credential; empty means anonymous.
    pub token: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxDbConfig {
    pub url: String,
    pub database: String,
    pub retention_policy: String,
    pub user: String,
    pub password: String,
    pub schema: SchemaVersion,
    pub verify_ssl: bool,
}

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            database: String::new(),
            retention_policy: String::new(),
            user: String::new(),
            password: String::new(),
            schema: SchemaVersion::default(),
            verify_ssl: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpJsonConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub verify_ssl: bool,
    /// Sent as `Referer` so receivers can tell where the payload came from.
    pub referer: String,
}

impl Default for HttpJsonConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: String::new(),
            password: String::new(),
            verify_ssl: true,
            referer: DEFAULT_REFERER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsdConfig {
    pub host: String,
    pub port: u16,
    pub prefix: String,
    /// Seconds between collector re-resolutions.
    pub ttl_secs: u64,
    pub max_packet_bytes: usize,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_STATSD_PORT,
            prefix: DEFAULT_STATSD_PREFIX.to_string(),
            ttl_secs: DEFAULT_CLIENT_TTL_SECS,
            max_packet_bytes: DEFAULT_STATSD_MAX_PACKET_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub github: GithubConfig,
    pub influxdb: InfluxDbConfig,
    pub http: HttpJsonConfig,
    pub statsd: StatsdConfig,
}

impl NotifierConfig {
    /// Defaults plus `STAGECAST_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            NotifyError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| NotifyError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    /// Environment wins over whatever was loaded before.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("STAGECAST_GITHUB_ENABLED") {
            self.github.enabled = parse_var("STAGECAST_GITHUB_ENABLED", &v)?;
        }
        if let Some(v) = lookup("STAGECAST_GITHUB_API_URL") {
            self.github.api_url = v;
        }
        if let Some(v) = lookup("STAGECAST_GITHUB_TOKEN") {
            self.github.token = v;
        }

        if let Some(v) = lookup("STAGECAST_INFLUXDB_URL") {
            self.influxdb.url = v;
        }
        if let Some(v) = lookup("STAGECAST_INFLUXDB_DATABASE") {
            self.influxdb.database = v;
        }
        if let Some(v) = lookup("STAGECAST_INFLUXDB_RETENTION_POLICY") {
            self.influxdb.retention_policy = v;
        }
        if let Some(v) = lookup("STAGECAST_INFLUXDB_USER") {
            self.influxdb.user = v;
        }
        if let Some(v) = lookup("STAGECAST_INFLUXDB_PASSWORD") {
            self.influxdb.password = v;
        }
        if let Some(v) = lookup("STAGECAST_INFLUXDB_SCHEMA") {
            self.influxdb.schema = SchemaVersion::from_str(&v)?;
        }
        if let Some(v) = lookup("STAGECAST_INFLUXDB_VERIFY_SSL") {
            self.influxdb.verify_ssl = parse_var("STAGECAST_INFLUXDB_VERIFY_SSL", &v)?;
        }

        if let Some(v) = lookup("STAGECAST_HTTP_URL") {
            self.http.url = v;
        }
        if let Some(v) = lookup("STAGECAST_HTTP_USER") {
            self.http.user = v;
        }
        if let Some(v) = lookup("STAGECAST_HTTP_PASSWORD") {
            self.http.password = v;
        }
        if let Some(v) = lookup("STAGECAST_HTTP_VERIFY_SSL") {
            self.http.verify_ssl = parse_var("STAGECAST_HTTP_VERIFY_SSL", &v)?;
        }
        if let Some(v) = lookup("STAGECAST_HTTP_REFERER") {
            self.http.referer = v;
        }

        if let Some(v) = lookup("STAGECAST_STATSD_HOST") {
            self.statsd.host = v;
        }
        if let Some(v) = lookup("STAGECAST_STATSD_PORT") {
            self.statsd.port = parse_var("STAGECAST_STATSD_PORT", &v)?;
        }
        if let Some(v) = lookup("STAGECAST_STATSD_PREFIX") {
            self.statsd.prefix = v;
        }
        if let Some(v) = lookup("STAGECAST_STATSD_TTL_SECS") {
            self.statsd.ttl_secs = parse_var("STAGECAST_STATSD_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("STAGECAST_STATSD_MAX_PACKET_BYTES") {
            self.statsd.max_packet_bytes = parse_var("STAGECAST_STATSD_MAX_PACKET_BYTES", &v)?;
        }

        if self.github.enabled && self.github.token.is_empty() {
            tracing::debug!("STAGECAST_GITHUB_TOKEN not set -- commit statuses are sent anonymously");
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| NotifyError::Config(format!("{}={:?}: {}", key, value, e)))
}
