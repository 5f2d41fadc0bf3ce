#[cfg(test)]
mod tests {
    use crate::connection::manager::ConnectionManager;
    use crate::connection::types::ConnectionSettings;
    use crate::health::handlers::{handle_health, health_router};
    use crate::health::protocol::{HEALTH_PATH, HealthResponse};
    use crate::kv::client::ConnectOptions;
    use crate::kv::memory::{MemoryConnector, MemoryKv};
    use axum::extract::Extension;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use std::time::Duration;

    fn manager(store: Arc<MemoryKv>) -> Arc<ConnectionManager> {
        let settings = ConnectionSettings {
            connect: ConnectOptions {
                endpoints: vec!["memory".to_string()],
                credentials: None,
                dial_timeout: Duration::from_millis(200),
            },
            reconnect_interval: Duration::from_millis(20),
            max_reconnect_interval: Duration::from_millis(80),
            health_check_interval: Duration::from_millis(30),
        };
        ConnectionManager::new(settings, MemoryConnector::new(store))
    }

    #[test]
    fn test_response_shape() {
        let body = serde_json::to_value(HealthResponse::from_store(true)).unwrap();

        assert_eq!(
            body,
            serde_json::json!({"status": "up", "components": {"store": "up"}})
        );
        assert!(!HealthResponse::from_store(false).is_up());
    }

    #[tokio::test]
    async fn test_connected_store_reports_up() {
        let connection = manager(MemoryKv::new());
        connection.try_connect().await.unwrap();

        let (status, body) = handle_health(Extension(connection)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.0.is_up());
    }

    #[tokio::test]
    async fn test_disconnected_store_reports_down() {
        let connection = manager(MemoryKv::new());

        let (status, body) = handle_health(Extension(connection)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.0.components.store, "down");
    }

    #[tokio::test]
    async fn test_health_route_over_http() {
        // ARRANGE
        let store = MemoryKv::new();
        let connection = manager(store.clone());
        connection.try_connect().await.unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = health_router(connection.clone());
        tokio::spawn(async move { axum::serve(listener, app).await });
        let url = format!("http://{}{}", addr, HEALTH_PATH);

        // ACT
        let up = reqwest::get(&url).await.unwrap();
        store.set_reachable(false);
        connection.check_health().await;
        let down = reqwest::get(&url).await.unwrap();

        // ASSERT
        assert_eq!(up.status().as_u16(), 200);
        assert_eq!(down.status().as_u16(), 503);
        let body: HealthResponse = down.json().await.unwrap();
        assert_eq!(body, HealthResponse::from_store(false));
    }
}
