use crate::config::types::StoreConfig;
use crate::kv::client::{ConnectOptions, Credentials};
use crate::kv::error::KvError;

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Lifecycle of the store connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Result of a single health check tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Not connected; reconnecting is the connect loop's job.
    Skipped,
    Healthy,
    /// The probe failed and the handle was dropped.
    Failed,
}

/// Timing and addressing used by the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub connect: ConnectOptions,
    pub reconnect_interval: Duration,
    pub max_reconnect_interval: Duration,
    pub health_check_interval: Duration,
}

impl From<&StoreConfig> for ConnectionSettings {
    fn from(config: &StoreConfig) -> Self {
        let credentials = config.credentials().map(|(username, password)| Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });

        Self {
            connect: ConnectOptions {
                endpoints: config.endpoints.clone(),
                credentials,
                dial_timeout: config.dial_timeout(),
            },
            reconnect_interval: config.reconnect_interval(),
            max_reconnect_interval: config.max_reconnect_interval(),
            health_check_interval: config.health_check_interval(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("store not connected")]
    NotConnected,

    #[error("timeout waiting for store connection after {0:?}")]
    Timeout(Duration),

    #[error("no store endpoints configured")]
    NoEndpoints,

    #[error("failed to create store client: {0}")]
    Connect(KvError),

    #[error("failed to reach store: {0}")]
    Probe(KvError),

    #[error("connection manager is shutting down")]
    ShuttingDown,
}

/// Next reconnect interval after a failed attempt: doubled, capped at `max`.
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.checked_mul(2).unwrap_or(max).min(max)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
