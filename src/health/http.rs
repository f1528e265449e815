//! HTTP transport for health checks.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! - `GET /health`: `200` with the report when healthy, `503` otherwise.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use super::HealthCheck;

/// Build an axum `Router` serving `GET /health`.
pub fn router(check: Arc<HealthCheck>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(check)
}

/// Serve the health endpoint at the given address (e.g. `"127.0.0.1:3000"`).
pub async fn serve(check: Arc<HealthCheck>, addr: &str) -> Result<(), std::io::Error> {
    let app = router(check);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health_handler(State(check): State<Arc<HealthCheck>>) -> impl IntoResponse {
    // The check touches the pool, which blocks.
    let report = match tokio::task::spawn_blocking(move || check.check()).await {
        Ok(report) => report,
        Err(err) => {
            let body = serde_json::json!({ "ok": false, "error": err.to_string() });
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }
    };
    let status = if report.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
