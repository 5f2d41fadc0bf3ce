//! KV Module Tests
//!
//! ## Test Scopes
//! - **etcd helpers**: Range-end computation, endpoint normalization and gateway decoding.
//! - **EtcdClient**: Construction, closed-handle behavior, and gateway behavior against an
//!   in-process axum stand-in for the JSON gateway (no live etcd required).
//! - **MemoryKv**: Contract semantics of the in-process backend.

#[cfg(test)]
mod tests {
    use crate::kv::client::{ConnectOptions, Credentials, KvClient, KvConnector};
    use crate::kv::error::KvError;
    use crate::kv::etcd::{EtcdClient, normalize_endpoint, prefix_range_end};
    use crate::kv::memory::{MemoryConnector, MemoryKv};
    use crate::kv::protocol::{
        AUTH_HEADER, DeleteRangeResponse, ENDPOINT_AUTHENTICATE, ENDPOINT_RANGE, GatewayError,
        RangeRequest, RangeResponse,
    };
    use crate::storage::keys::KeyLayout;
    use crate::storage::sync::RecordSynchronizer;
    use crate::storage::types::Domain;
    use axum::extract::Extension;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn options(endpoints: &[&str]) -> ConnectOptions {
        ConnectOptions {
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            credentials: None,
            dial_timeout: Duration::from_millis(200),
        }
    }

    const WWW_X1: &str = "/skydns/com/example/www/x1";
    const WWW_X2: &str = "/skydns/com/example/www/x2";

    /// Stand-in for etcd's JSON gateway: serves a fixed range and, optionally, enforces
    /// the token handed out by the last authentication.
    struct FakeGateway {
        pairs: Vec<(Vec<u8>, Vec<u8>)>,
        require_token: bool,
        valid_token: Mutex<Option<String>>,
        reject_all: AtomicBool,
        auth_calls: AtomicU64,
    }

    impl FakeGateway {
        fn new(pairs: Vec<(&[u8], &[u8])>, require_token: bool) -> Arc<Self> {
            Arc::new(Self {
                pairs: pairs
                    .into_iter()
                    .map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .collect(),
                require_token,
                valid_token: Mutex::new(None),
                reject_all: AtomicBool::new(false),
                auth_calls: AtomicU64::new(0),
            })
        }

        fn expire_token(&self) {
            *self.valid_token.lock().unwrap() = None;
        }

        fn auth_calls(&self) -> u64 {
            self.auth_calls.load(Ordering::SeqCst)
        }
    }

    async fn fake_authenticate(Extension(gateway): Extension<Arc<FakeGateway>>) -> Json<Value> {
        let issued = gateway.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("token-{}", issued);
        *gateway.valid_token.lock().unwrap() = Some(token.clone());
        Json(json!({"header": {}, "token": token}))
    }

    async fn fake_range(
        Extension(gateway): Extension<Arc<FakeGateway>>,
        headers: HeaderMap,
    ) -> (StatusCode, Json<Value>) {
        let presented = headers
            .get(AUTH_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let accepted = !gateway.reject_all.load(Ordering::SeqCst)
            && (!gateway.require_token
                || (presented.is_some() && presented == *gateway.valid_token.lock().unwrap()));

        if !accepted {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "etcdserver: invalid auth token",
                    "code": 16,
                    "message": "etcdserver: invalid auth token"
                })),
            );
        }

        let kvs: Vec<Value> = gateway
            .pairs
            .iter()
            .map(|(k, v)| json!({"key": STANDARD.encode(k), "value": STANDARD.encode(v)}))
            .collect();
        let count = kvs.len().to_string();
        (StatusCode::OK, Json(json!({"header": {}, "kvs": kvs, "count": count})))
    }

    async fn spawn_gateway(gateway: Arc<FakeGateway>) -> String {
        let app = Router::new()
            .route(ENDPOINT_RANGE, post(fake_range))
            .route(ENDPOINT_AUTHENTICATE, post(fake_authenticate))
            .layer(Extension(gateway));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        addr.to_string()
    }

    fn with_credentials(mut opts: ConnectOptions) -> ConnectOptions {
        opts.credentials = Some(Credentials {
            username: "root".to_string(),
            password: "secret".to_string(),
        });
        opts
    }

    // ============================================================
    // ETCD HELPERS
    // ============================================================

    #[test]
    fn test_prefix_range_end_increments_last_byte() {
        assert_eq!(prefix_range_end(b"/skydns/com/"), b"/skydns/com0".to_vec());
        assert_eq!(prefix_range_end(b"a"), b"b".to_vec());
    }

    #[test]
    fn test_prefix_range_end_drops_trailing_ff() {
        assert_eq!(prefix_range_end(&[b'a', 0xff, 0xff]), vec![b'b']);
        assert_eq!(prefix_range_end(&[0xff, 0xff]), vec![0]);
        assert_eq!(prefix_range_end(b""), vec![0]);
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("127.0.0.1:2379"), "http://127.0.0.1:2379");
        assert_eq!(normalize_endpoint("https://etcd:2379/"), "https://etcd:2379");
        assert_eq!(normalize_endpoint(" etcd-0:2379 "), "http://etcd-0:2379");
    }

    #[test]
    fn test_range_response_accepts_string_and_number_counts() {
        let as_string: RangeResponse =
            serde_json::from_str(r#"{"header":{},"count":"3"}"#).unwrap();
        assert_eq!(as_string.count, 3);
        assert!(as_string.kvs.is_empty());

        let as_number: RangeResponse = serde_json::from_str(r#"{"count":7}"#).unwrap();
        assert_eq!(as_number.count, 7);

        let missing: DeleteRangeResponse = serde_json::from_str(r#"{"header":{}}"#).unwrap();
        assert_eq!(missing.deleted, 0);
    }

    #[test]
    fn test_range_response_value_defaults_to_empty() {
        let resp: RangeResponse =
            serde_json::from_str(r#"{"kvs":[{"key":"L2Zvbw==","mod_revision":"4"}],"count":"1"}"#)
                .unwrap();
        assert_eq!(resp.kvs.len(), 1);
        assert_eq!(resp.kvs[0].key, "L2Zvbw==");
        assert_eq!(resp.kvs[0].value, "");
    }

    #[test]
    fn test_range_request_omits_unset_fields() {
        let request = RangeRequest {
            key: "a2V5".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"key": "a2V5"}));
    }

    #[test]
    fn test_gateway_error_prefers_message() {
        let err: GatewayError =
            serde_json::from_str(r#"{"error":"etcdserver: x","code":3,"message":"bad key"}"#)
                .unwrap();
        assert_eq!(err.describe(), "bad key");

        let err: GatewayError = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
        assert_eq!(err.describe(), "boom");
    }

    // ============================================================
    // ETCD CLIENT
    // ============================================================

    #[tokio::test]
    async fn test_etcd_connect_requires_endpoints() {
        let result = EtcdClient::connect(&options(&[])).await;
        assert!(matches!(result, Err(KvError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_etcd_closed_client_rejects_operations() {
        // Building the client without credentials performs no I/O.
        let client = EtcdClient::connect(&options(&["127.0.0.1:1"])).await.unwrap();
        client.close().await;

        assert!(matches!(client.get("/k").await, Err(KvError::Closed)));
        assert!(matches!(client.put("/k", "v").await, Err(KvError::Closed)));
        assert!(matches!(client.status("127.0.0.1:1").await, Err(KvError::Closed)));
    }

    #[tokio::test]
    async fn test_etcd_unreachable_endpoints_surface_error() {
        let client = EtcdClient::connect(&options(&["127.0.0.1:1", "127.0.0.1:2"]))
            .await
            .unwrap();

        let result = client.list_prefix("/skydns/").await;
        assert!(matches!(result, Err(KvError::Unreachable(_))));
        assert!(client.status("127.0.0.1:1").await.is_err());
    }

    #[tokio::test]
    async fn test_etcd_authentication_failure_fails_connect() {
        let mut opts = options(&["127.0.0.1:1"]);
        opts.credentials = Some(Credentials {
            username: "root".to_string(),
            password: "secret".to_string(),
        });
        assert!(EtcdClient::connect(&opts).await.is_err());
    }

    #[tokio::test]
    async fn test_etcd_listing_skips_undecodable_entries() {
        // ARRANGE: one readable record, one value that is not UTF-8
        let record = br#"{"host":"10.0.0.1","ttl":300}"#;
        let gateway = FakeGateway::new(
            vec![
                (WWW_X1.as_bytes(), record.as_slice()),
                (WWW_X2.as_bytes(), [0xff, 0xfe].as_slice()),
            ],
            false,
        );
        let addr = spawn_gateway(gateway).await;
        let client = EtcdClient::connect(&options(&[addr.as_str()])).await.unwrap();

        // ACT
        let pairs = client.list_prefix("/skydns/com/example/www/").await.unwrap();

        // ASSERT
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].key, WWW_X1);
        assert_eq!(pairs[0].value.as_bytes(), record.as_slice());
    }

    #[tokio::test]
    async fn test_sync_survives_undecodable_record_from_etcd() {
        let record = br#"{"host":"10.0.0.1","ttl":300}"#;
        let gateway = FakeGateway::new(
            vec![
                (WWW_X1.as_bytes(), record.as_slice()),
                (WWW_X2.as_bytes(), [0xff, 0xfe].as_slice()),
            ],
            false,
        );
        let addr = spawn_gateway(gateway).await;
        let client = EtcdClient::connect(&options(&[addr.as_str()])).await.unwrap();
        let sync = RecordSynchronizer::new(KeyLayout::default());
        let domain = Domain::new("example.com", "www", vec!["10.0.0.1".to_string()], 300);

        let report = sync.sync(&client, &domain).await.unwrap();

        assert!(report.is_noop());
        assert_eq!(report.unchanged, 1);
    }

    #[tokio::test]
    async fn test_etcd_reauthenticates_after_token_expiry() {
        // ARRANGE
        let gateway = FakeGateway::new(vec![(WWW_X1.as_bytes(), b"v1".as_slice())], true);
        let addr = spawn_gateway(gateway.clone()).await;
        let client = EtcdClient::connect(&with_credentials(options(&[addr.as_str()])))
            .await
            .unwrap();
        assert_eq!(gateway.auth_calls(), 1);
        assert_eq!(client.get(WWW_X1).await.unwrap().as_deref(), Some("v1"));

        // ACT: the server forgets the token, as etcd does once its TTL lapses
        gateway.expire_token();
        let first = client.get(WWW_X1).await;
        let second = client.get(WWW_X1).await;

        // ASSERT: one re-authentication, then requests succeed on the new token
        assert_eq!(first.unwrap().as_deref(), Some("v1"));
        assert_eq!(second.unwrap().as_deref(), Some("v1"));
        assert_eq!(gateway.auth_calls(), 2);
    }

    #[tokio::test]
    async fn test_etcd_rejected_token_is_retried_only_once() {
        let gateway = FakeGateway::new(vec![(WWW_X1.as_bytes(), b"v1".as_slice())], true);
        let addr = spawn_gateway(gateway.clone()).await;
        let client = EtcdClient::connect(&with_credentials(options(&[addr.as_str()])))
            .await
            .unwrap();
        gateway.reject_all.store(true, Ordering::SeqCst);

        let result = client.get(WWW_X1).await;

        assert!(matches!(&result, Err(e) if e.is_unauthenticated()));
        assert_eq!(gateway.auth_calls(), 2);
    }

    #[tokio::test]
    async fn test_etcd_without_credentials_does_not_reauthenticate() {
        let gateway = FakeGateway::new(vec![(WWW_X1.as_bytes(), b"v1".as_slice())], true);
        let addr = spawn_gateway(gateway.clone()).await;
        let client = EtcdClient::connect(&options(&[addr.as_str()])).await.unwrap();

        let result = client.get(WWW_X1).await;

        assert!(matches!(result, Err(KvError::Status { code: 401, .. })));
        assert_eq!(gateway.auth_calls(), 0);
    }

    // ============================================================
    // MEMORY STORE
    // ============================================================

    #[tokio::test]
    async fn test_memory_get_put_delete() {
        let kv = MemoryKv::new();

        assert_eq!(kv.get("/a").await.unwrap(), None);
        kv.put("/a", "1").await.unwrap();
        assert_eq!(kv.get("/a").await.unwrap(), Some("1".to_string()));

        assert_eq!(kv.delete("/a").await.unwrap(), 1);
        assert_eq!(kv.delete("/a").await.unwrap(), 0);
        assert_eq!(kv.get("/a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_prefix_operations_are_ordered_and_scoped() {
        let kv = MemoryKv::new();
        kv.insert_raw("/p/b", "2");
        kv.insert_raw("/p/a", "1");
        kv.insert_raw("/p/c", "3");
        kv.insert_raw("/q/a", "x");

        let listed = kv.list_prefix("/p/").await.unwrap();
        let keys: Vec<&str> = listed.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["/p/a", "/p/b", "/p/c"]);
        assert_eq!(kv.count_prefix("/p/").await.unwrap(), 3);

        assert_eq!(kv.delete_prefix("/p/").await.unwrap(), 3);
        assert_eq!(kv.count_prefix("/p/").await.unwrap(), 0);
        assert_eq!(kv.get("/q/a").await.unwrap(), Some("x".to_string()));
    }

    #[tokio::test]
    async fn test_memory_unreachable_fails_everything() {
        let kv = MemoryKv::new();
        kv.insert_raw("/a", "1");
        kv.set_reachable(false);

        assert!(kv.get("/a").await.is_err());
        assert!(kv.put("/b", "2").await.is_err());
        assert!(kv.status("mem").await.is_err());

        kv.set_reachable(true);
        assert!(kv.status("mem").await.is_ok());
        assert_eq!(kv.get("/a").await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_memory_stats_count_operations() {
        let kv = MemoryKv::new();
        kv.put("/a", "1").await.unwrap();
        kv.put("/b", "2").await.unwrap();
        kv.get("/a").await.unwrap();
        kv.delete("/a").await.unwrap();

        let stats = kv.stats();
        assert_eq!(stats.puts, 2);
        assert_eq!(stats.gets, 1);
        assert_eq!(stats.deletes, 1);

        kv.reset_stats();
        assert_eq!(kv.stats().puts, 0);
    }

    #[tokio::test]
    async fn test_memory_connector_shares_store() {
        let kv = MemoryKv::new();
        let connector = MemoryConnector::new(kv.clone());

        let client = connector.connect(&options(&["mem"])).await.unwrap();
        client.put("/shared", "yes").await.unwrap();

        assert_eq!(connector.attempts(), 1);
        assert_eq!(kv.snapshot().get("/shared"), Some(&"yes".to_string()));
    }
}
