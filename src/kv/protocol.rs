//! etcd v3 JSON Gateway Protocol
//!
//! Endpoints and Data Transfer Objects for etcd's gRPC-gateway. Keys and values travel
//! base64 encoded; 64-bit integers are usually rendered as JSON strings.

use serde::{Deserialize, Deserializer, Serialize};

// --- API Endpoints ---

/// Point reads, prefix reads and counts.
pub const ENDPOINT_RANGE: &str = "/v3/kv/range";
/// Single key writes.
pub const ENDPOINT_PUT: &str = "/v3/kv/put";
/// Single key and prefix deletes.
pub const ENDPOINT_DELETE_RANGE: &str = "/v3/kv/deleterange";
/// Member status, used as the liveness probe.
pub const ENDPOINT_STATUS: &str = "/v3/maintenance/status";
/// Exchanges a username/password for a token.
pub const ENDPOINT_AUTHENTICATE: &str = "/v3/auth/authenticate";

/// Header carrying the auth token on every request once authenticated.
pub const AUTH_HEADER: &str = "Authorization";

// --- Data Transfer Objects ---

/// Read request. Without `range_end` only `key` is read.
#[derive(Debug, Default, Serialize)]
pub struct RangeRequest {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_end: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub count_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_target: Option<&'static str>,
}

/// A stored pair as returned by the gateway.
#[derive(Debug, Deserialize)]
pub struct KeyValueB64 {
    pub key: String,
    /// Omitted by the gateway for empty values.
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeResponse {
    #[serde(default)]
    pub kvs: Vec<KeyValueB64>,
    #[serde(default, deserialize_with = "de_i64")]
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct PutRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Default, Serialize)]
pub struct DeleteRangeRequest {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteRangeResponse {
    #[serde(default, deserialize_with = "de_i64")]
    pub deleted: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct StatusRequest {}

#[derive(Debug, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct AuthenticateRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthenticateResponse {
    pub token: String,
}

/// Error body the gateway attaches to non-2xx answers.
#[derive(Debug, Default, Deserialize)]
pub struct GatewayError {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: i32,
}

impl GatewayError {
    pub fn describe(&self) -> String {
        if !self.message.is_empty() {
            self.message.clone()
        } else {
            self.error.clone()
        }
    }
}

/// Accepts an int64 rendered either as a JSON number or a JSON string.
fn de_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(i64),
        Str(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Num(n) => Ok(n),
        Repr::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
