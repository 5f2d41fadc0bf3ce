use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_DNS_ROOT: &str = "/skydns";
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:2379";

const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 5;
const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 5;
const DEFAULT_MAX_RECONNECT_INTERVAL_SECS: u64 = 30;
const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub store: StoreConfig,
    pub logger: LoggerConfig,
}

impl Config {
    /// Reads and parses the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        Ok(config)
    }
}

/// Bind address of the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// etcd v3 through its JSON gateway.
    #[default]
    Etcd,
    /// In-process store; nothing survives a restart.
    Memory,
}

/// Key-value store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub endpoints: Vec<String>,
    pub username: String,
    pub password: String,
    /// Seconds allowed for building a client and for each liveness probe.
    pub dial_timeout: u64,
    /// Seconds before the first reconnect; doubled after every failure.
    pub reconnect_interval: u64,
    /// Ceiling for the reconnect interval, in seconds.
    pub max_reconnect_interval: u64,
    pub health_check_interval: u64,
    /// Root under which the DNS server reads its records.
    pub dns_root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Etcd,
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            username: String::new(),
            password: String::new(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT_SECS,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL_SECS,
            max_reconnect_interval: DEFAULT_MAX_RECONNECT_INTERVAL_SECS,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            dns_root: DEFAULT_DNS_ROOT.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn dial_timeout(&self) -> Duration {
        secs_or(self.dial_timeout, DEFAULT_DIAL_TIMEOUT_SECS)
    }

    pub fn reconnect_interval(&self) -> Duration {
        secs_or(self.reconnect_interval, DEFAULT_RECONNECT_INTERVAL_SECS)
    }

    pub fn max_reconnect_interval(&self) -> Duration {
        secs_or(self.max_reconnect_interval, DEFAULT_MAX_RECONNECT_INTERVAL_SECS)
    }

    pub fn health_check_interval(&self) -> Duration {
        secs_or(self.health_check_interval, DEFAULT_HEALTH_CHECK_INTERVAL_SECS)
    }

    pub fn dns_root(&self) -> &str {
        if self.dns_root.trim().is_empty() {
            DEFAULT_DNS_ROOT
        } else {
            self.dns_root.trim()
        }
    }

    /// Credentials are only used when both halves are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((self.username.as_str(), self.password.as_str()))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn secs_or(value: u64, default: u64) -> Duration {
    Duration::from_secs(if value > 0 { value } else { default })
}
