use crate::connection::types::ConnectionError;
use crate::kv::error::KvError;

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No ready connection within the caller's wait budget. Retry later.
    #[error("key-value store temporarily unavailable")]
    Unavailable,

    #[error("zone not found: {0}")]
    ZoneNotFound(String),

    #[error("zone already exists: {0}")]
    ZoneExists(String),

    #[error("domain not found: {0}")]
    DomainNotFound(String),

    #[error("domain already exists: {0}")]
    DomainExists(String),

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Kv(#[from] KvError),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::ZoneNotFound(_) | StoreError::DomainNotFound(_))
    }
}

impl From<ConnectionError> for StoreError {
    fn from(err: ConnectionError) -> Self {
        tracing::debug!("Store not ready: {}", err);
        StoreError::Unavailable
    }
}
