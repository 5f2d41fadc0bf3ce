//! The key-value client contract.
//!
//! `KvClient` is what storage code talks to; `KvConnector` is how the connection
//! manager obtains a fresh `KvClient` on every connect attempt.

use super::error::KvError;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub type KvResult<T> = Result<T, KvError>;

/// A single key-value pair returned by a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Optional username/password pair for stores with authentication enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Everything a connector needs to build a client.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub endpoints: Vec<String>,
    pub credentials: Option<Credentials>,
    /// Upper bound for establishing a connection and for the liveness probe.
    pub dial_timeout: Duration,
}

impl ConnectOptions {
    /// The endpoint liveness probes are sent to.
    pub fn probe_endpoint(&self) -> Option<&str> {
        self.endpoints.first().map(String::as_str)
    }
}

/// Operations the core issues against the remote store.
///
/// Implementations must be cheap to share behind an `Arc`; every storage component
/// holds the same handle until the connection manager replaces it.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Returns the value stored at `key`, or `None` when absent.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    async fn put(&self, key: &str, value: &str) -> KvResult<()>;

    /// Deletes a single key and returns how many keys were removed (0 or 1).
    async fn delete(&self, key: &str) -> KvResult<u64>;

    /// Deletes every key starting with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> KvResult<u64>;

    /// Lists every pair whose key starts with `prefix`, in ascending key order.
    async fn list_prefix(&self, prefix: &str) -> KvResult<Vec<KeyValue>>;

    async fn count_prefix(&self, prefix: &str) -> KvResult<u64>;

    /// Liveness probe against one endpoint.
    async fn status(&self, endpoint: &str) -> KvResult<()>;

    /// Releases the underlying resources. Further calls may fail with `KvError::Closed`.
    async fn close(&self);
}

/// Builds clients for the connection manager.
#[async_trait]
pub trait KvConnector: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> KvResult<Arc<dyn KvClient>>;
}
