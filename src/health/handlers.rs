use axum::{Json, Router, extract::Extension, http::StatusCode, routing::get};
use std::sync::Arc;

use super::protocol::{HEALTH_PATH, HealthResponse};
use crate::connection::manager::ConnectionManager;

pub fn health_router(connection: Arc<ConnectionManager>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(handle_health))
        .layer(Extension(connection))
}

/// 200 when the store is connected, 503 otherwise.
pub async fn handle_health(
    Extension(connection): Extension<Arc<ConnectionManager>>,
) -> (StatusCode, Json<HealthResponse>) {
    let connected = connection.is_connected().await;
    if !connected {
        tracing::debug!("Health check reporting store down ({})", connection.state().await);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::from_store(false)),
        );
    }

    (StatusCode::OK, Json(HealthResponse::from_store(true)))
}
