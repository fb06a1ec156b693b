//! HTTP server for Prometheus metrics and health checks
//!
//! Runs a lightweight HTTP server on a separate port from the Scribe listener.
//!
//! # Endpoints
//!
//! - `GET /metrics` - Prometheus metrics
//! - `GET /health` - Backend health as JSON, 503 when the backend is down
//!
//! # Example
//!
//! ```ignore
//! use scriber_gateway::metrics_server::MetricsServer;
//!
//! let metrics_handle = MetricsServer::start(9090, Some(backend.clone()));
//! ```

use axum::extract::State;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use scriber_core::QueueBackend;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared state for the metrics server
#[derive(Clone)]
struct AppState {
    backend: Option<Arc<dyn QueueBackend>>,
}

/// Metrics HTTP server
pub struct MetricsServer;

impl MetricsServer {
    /// Start the metrics server on the given port, all interfaces
    ///
    /// Returns a JoinHandle that can be used to abort the server.
    /// The server runs until aborted or the process exits.
    pub fn start(port: u16, backend: Option<Arc<dyn QueueBackend>>) -> JoinHandle<()> {
        Self::start_on(SocketAddr::from(([0, 0, 0, 0], port)), backend)
    }

    /// Start the metrics server on a specific address
    pub fn start_on(addr: SocketAddr, backend: Option<Arc<dyn QueueBackend>>) -> JoinHandle<()> {
        let app = router(AppState { backend });

        tokio::spawn(async move {
            info!(%addr, "Metrics server starting");

            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, %addr, "Failed to bind metrics server");
                    return;
                }
            };

            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "Metrics server error");
            }
        })
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Handler for /metrics endpoint
async fn metrics_handler() -> impl IntoResponse {
    let body = crate::metrics::gather();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[derive(serde::Serialize)]
struct HealthSummary {
    status: &'static str,
    backend: Option<BackendHealth>,
}

#[derive(serde::Serialize)]
struct BackendHealth {
    name: &'static str,
    healthy: bool,
}

/// Handler for /health endpoint
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let backend = match &state.backend {
        Some(backend) => Some(BackendHealth {
            name: backend.name(),
            healthy: backend.health().await,
        }),
        None => None,
    };

    let healthy = backend.as_ref().map_or(true, |b| b.healthy);
    let (code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (code, Json(HealthSummary { status, backend })).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::emit::MemoryQueue;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 10_000)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_handler_returns_prometheus_format() {
        let _ = crate::metrics::Metrics::init();

        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
    }

    #[tokio::test]
    async fn test_health_without_backend() {
        let response = health_handler(State(AppState { backend: None }))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert!(json["backend"].is_null());
    }

    #[tokio::test]
    async fn test_health_reports_backend() {
        let queue = Arc::new(MemoryQueue::new());
        let state = AppState {
            backend: Some(queue.clone()),
        };

        let response = health_handler(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["backend"]["name"], "memory");
        assert_eq!(json["backend"]["healthy"], true);

        queue.set_available(false);
        let response = health_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_server_serves_health_over_http() {
        // Bind to an ephemeral port first so the test knows where to connect
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let handle = MetricsServer::start_on(addr, Some(Arc::new(MemoryQueue::new())));

        let mut response = String::new();
        for _ in 0..50 {
            if let Ok(text) = http_get(addr, "/health").await {
                response = text;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        handle.abort();

        assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
        assert!(response.contains("\"healthy\""));
    }

    async fn http_get(addr: SocketAddr, path: &str) -> std::io::Result<String> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::TcpStream::connect(addr).await?;
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
