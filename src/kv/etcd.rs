//! etcd v3 client over the JSON gRPC gateway.
//!
//! Every operation is a single HTTP POST. Requests go to the endpoint that last
//! answered; on a transport failure the next configured endpoint is tried before the
//! error is surfaced. A request rejected for its auth token is retried once after
//! re-authenticating; any other retry is left to the caller.

use super::client::{ConnectOptions, Credentials, KeyValue, KvClient, KvConnector, KvResult};
use super::error::KvError;
use super::protocol::*;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct EtcdClient {
    http: reqwest::Client,
    endpoints: Vec<String>,
    active: AtomicUsize,
    credentials: Option<Credentials>,
    token: RwLock<Option<String>>,
    closed: AtomicBool,
}

impl EtcdClient {
    /// Builds a client and, when credentials are configured, authenticates against the
    /// first endpoint that answers. No liveness probe is issued here.
    pub async fn connect(options: &ConnectOptions) -> KvResult<Self> {
        if options.endpoints.is_empty() {
            return Err(KvError::Unreachable("no endpoints configured".to_string()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(options.dial_timeout)
            .timeout(REQUEST_TIMEOUT.max(options.dial_timeout))
            .build()?;

        let client = Self {
            http,
            endpoints: options.endpoints.iter().map(|e| normalize_endpoint(e)).collect(),
            active: AtomicUsize::new(0),
            credentials: options.credentials.clone(),
            token: RwLock::new(None),
            closed: AtomicBool::new(false),
        };

        client.authenticate().await?;
        Ok(client)
    }

    /// Exchanges the configured credentials for a fresh token. A no-op without credentials.
    async fn authenticate(&self) -> KvResult<()> {
        let Some(credentials) = &self.credentials else {
            return Ok(());
        };

        let request = AuthenticateRequest {
            name: credentials.username.clone(),
            password: credentials.password.clone(),
        };
        let response: AuthenticateResponse =
            self.post_once(ENDPOINT_AUTHENTICATE, &request).await?;
        *self.token.write().await = Some(response.token);

        tracing::debug!("Authenticated against etcd as {}", credentials.username);
        Ok(())
    }

    fn ensure_open(&self) -> KvResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::Closed);
        }
        Ok(())
    }

    /// `post_once`, plus one re-authentication and retry when the token is rejected.
    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> KvResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        match self.post_once(path, body).await {
            Err(e) if e.is_unauthenticated() && self.credentials.is_some() => {
                tracing::warn!("etcd rejected the auth token ({}), re-authenticating", e);
                self.authenticate().await?;
                self.post_once(path, body).await
            }
            result => result,
        }
    }

    async fn post_once<Req, Resp>(&self, path: &str, body: &Req) -> KvResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.ensure_open()?;

        let start = self.active.load(Ordering::Relaxed);
        let mut last_error = String::new();

        for offset in 0..self.endpoints.len() {
            let idx = (start + offset) % self.endpoints.len();
            let base = &self.endpoints[idx];

            match self.send(base, path, body).await {
                Ok(response) => {
                    if idx != start {
                        tracing::info!("Switched active etcd endpoint to {}", base);
                        self.active.store(idx, Ordering::Relaxed);
                    }
                    return decode_response(response).await;
                }
                Err(e) => {
                    tracing::warn!("etcd endpoint {} failed: {}", base, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(KvError::Unreachable(last_error))
    }

    async fn send<Req>(&self, base: &str, path: &str, body: &Req) -> Result<reqwest::Response, reqwest::Error>
    where
        Req: Serialize + ?Sized,
    {
        let token = if path == ENDPOINT_AUTHENTICATE {
            None
        } else {
            self.token.read().await.clone()
        };

        let mut request = self.http.post(format!("{}{}", base, path)).json(body);
        if let Some(token) = token {
            request = request.header(AUTH_HEADER, token);
        }
        request.send().await
    }
}

async fn decode_response<Resp: DeserializeOwned>(response: reqwest::Response) -> KvResult<Resp> {
    let status = response.status();
    if !status.is_success() {
        let body: GatewayError = response.json().await.unwrap_or_default();
        return Err(KvError::Status {
            code: status.as_u16(),
            message: body.describe(),
        });
    }
    Ok(response.json().await?)
}

#[async_trait]
impl KvClient for EtcdClient {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let request = RangeRequest {
            key: encode(key.as_bytes()),
            ..Default::default()
        };
        let response: RangeResponse = self.post(ENDPOINT_RANGE, &request).await?;

        match response.kvs.into_iter().next() {
            Some(kv) => Ok(Some(decode_text(&kv.value)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str) -> KvResult<()> {
        let request = PutRequest {
            key: encode(key.as_bytes()),
            value: encode(value.as_bytes()),
        };
        let _: IgnoredAny = self.post(ENDPOINT_PUT, &request).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<u64> {
        let request = DeleteRangeRequest {
            key: encode(key.as_bytes()),
            range_end: None,
        };
        let response: DeleteRangeResponse = self.post(ENDPOINT_DELETE_RANGE, &request).await?;
        Ok(response.deleted.max(0) as u64)
    }

    async fn delete_prefix(&self, prefix: &str) -> KvResult<u64> {
        let request = DeleteRangeRequest {
            key: encode(prefix.as_bytes()),
            range_end: Some(encode(&prefix_range_end(prefix.as_bytes()))),
        };
        let response: DeleteRangeResponse = self.post(ENDPOINT_DELETE_RANGE, &request).await?;
        Ok(response.deleted.max(0) as u64)
    }

    async fn list_prefix(&self, prefix: &str) -> KvResult<Vec<KeyValue>> {
        let request = RangeRequest {
            key: encode(prefix.as_bytes()),
            range_end: Some(encode(&prefix_range_end(prefix.as_bytes()))),
            sort_order: Some("ASCEND"),
            sort_target: Some("KEY"),
            ..Default::default()
        };
        let response: RangeResponse = self.post(ENDPOINT_RANGE, &request).await?;

        Ok(response
            .kvs
            .into_iter()
            .filter_map(|kv| match decode_pair(&kv) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    tracing::warn!("Skipping undecodable entry {} under {}: {}", kv.key, prefix, e);
                    None
                }
            })
            .collect())
    }

    async fn count_prefix(&self, prefix: &str) -> KvResult<u64> {
        let request = RangeRequest {
            key: encode(prefix.as_bytes()),
            range_end: Some(encode(&prefix_range_end(prefix.as_bytes()))),
            count_only: true,
            ..Default::default()
        };
        let response: RangeResponse = self.post(ENDPOINT_RANGE, &request).await?;
        Ok(response.count.max(0) as u64)
    }

    async fn status(&self, endpoint: &str) -> KvResult<()> {
        self.ensure_open()?;
        let base = normalize_endpoint(endpoint);
        let response = self.send(&base, ENDPOINT_STATUS, &StatusRequest::default()).await?;
        let status: StatusResponse = decode_response(response).await?;
        tracing::trace!("etcd {} reports version {}", base, status.version);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Connector producing `EtcdClient`s.
#[derive(Debug, Default, Clone)]
pub struct EtcdConnector;

#[async_trait]
impl KvConnector for EtcdConnector {
    async fn connect(&self, options: &ConnectOptions) -> KvResult<Arc<dyn KvClient>> {
        let client = EtcdClient::connect(options).await?;
        Ok(Arc::new(client))
    }
}

/// Adds a scheme to bare `host:port` endpoints and strips trailing slashes.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// etcd's range end for "every key starting with `prefix`".
///
/// The last byte below 0xff is incremented and everything after it dropped. A prefix
/// made only of 0xff bytes (or an empty one) ranges to the end of the keyspace, `"\0"`.
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn decode_pair(kv: &KeyValueB64) -> KvResult<KeyValue> {
    Ok(KeyValue {
        key: decode_text(&kv.key)?,
        value: decode_text(&kv.value)?,
    })
}

fn decode_text(b64: &str) -> KvResult<String> {
    let bytes = STANDARD
        .decode(b64)
        .map_err(|e| KvError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| KvError::Decode(e.to_string()))
}
