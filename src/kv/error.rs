use thiserror::Error;

/// Failures reported by a key-value backend.
#[derive(Debug, Error)]
pub enum KvError {
    /// The request never got a response (refused, timed out, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The store answered with a non-success status.
    #[error("store returned status {code}: {message}")]
    Status { code: u16, message: String },

    /// The store's response could not be decoded.
    #[error("failed to decode store response: {0}")]
    Decode(String),

    /// The handle was closed and must not be used anymore.
    #[error("client is closed")]
    Closed,

    /// No configured endpoint can be reached.
    #[error("store unreachable: {0}")]
    Unreachable(String),
}

impl KvError {
    /// The store refused the request's credentials (missing, invalid or expired token).
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, KvError::Status { code: 401, .. })
    }
}

impl From<reqwest::Error> for KvError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            KvError::Decode(err.to_string())
        } else {
            KvError::Transport(err.to_string())
        }
    }
}
