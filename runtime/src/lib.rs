//! scriber runtime - process wiring for the Scribe bridge
//!
//! Provides [`run()`] for zero-boilerplate startup from environment
//! variables, and [`RuntimeBuilder`] for callers that need to override the
//! listen addresses.
//!
//! # Quick start
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     scriber_runtime::run().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

use scriber_core::{MetricsSink, QueueBackend};
use scriber_gateway::config::{BackendKind, Config, LogFormat};
use scriber_gateway::metrics_server::MetricsServer;
use scriber_gateway::{Handler, MemoryQueue, PrometheusSink, QueueRouter, RedisQueue, ScribeServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Run the bridge with settings from the environment.
///
/// Loads configuration, initialises tracing and metrics, connects the queue
/// backend lazily, then serves Scribe until Ctrl+C or SIGTERM.
pub async fn run() -> anyhow::Result<()> {
    RuntimeBuilder::new().run().await
}

/// Builder for overriding runtime behaviour.
///
/// # Example
///
/// ```ignore
/// RuntimeBuilder::new()
///     .scribe_addr("0.0.0.0:1464".parse()?)
///     .metrics_port(9091)
///     .run()
///     .await
/// ```
pub struct RuntimeBuilder {
    scribe_addr: Option<SocketAddr>,
    metrics_port: Option<u16>,
    metrics_enabled: bool,
}

impl RuntimeBuilder {
    /// Create a new builder with defaults from environment variables.
    pub fn new() -> Self {
        Self {
            scribe_addr: None,
            metrics_port: None,
            metrics_enabled: true,
        }
    }

    /// Override the Scribe listen address.
    ///
    /// Default: loaded from `SCRIBER_SCRIBE_ADDR` env var, or `0.0.0.0:1463`.
    pub fn scribe_addr(mut self, addr: SocketAddr) -> Self {
        self.scribe_addr = Some(addr);
        self
    }

    /// Override the metrics HTTP server port.
    ///
    /// Default: loaded from `SCRIBER_METRICS_ADDR` env var, or `9090`.
    pub fn metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    /// Do not start the metrics HTTP server.
    ///
    /// Prometheus series are still recorded.
    pub fn disable_metrics_server(mut self) -> Self {
        self.metrics_enabled = false;
        self
    }

    /// Run the bridge to completion.
    ///
    /// This is the terminal method; it returns after shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        // ── 1. Load config from env ──────────────────────────────
        let config = Config::from_env()?;

        // ── 2. Init tracing ──────────────────────────────────────
        init_tracing(&config);

        let scribe_addr = self.scribe_addr.unwrap_or(config.scribe_addr);
        let metrics_addr = match self.metrics_port {
            Some(port) => SocketAddr::new(config.metrics_addr.ip(), port),
            None => config.metrics_addr,
        };

        info!(
            %scribe_addr,
            %metrics_addr,
            mode = %config.mode,
            backend = ?config.backend,
            queue = %config.queue.key,
            shards = config.queue.shards,
            "Starting scriber"
        );

        // ── 3. Init metrics ──────────────────────────────────────
        let metrics: Arc<dyn MetricsSink> = Arc::new(PrometheusSink::init()?);

        // ── 4. Queue backend ─────────────────────────────────────
        let backend = build_backend(&config)?;

        // ── 5. Metrics HTTP server ───────────────────────────────
        let metrics_handle = if self.metrics_enabled {
            let handle = MetricsServer::start_on(metrics_addr, Some(Arc::clone(&backend)));
            info!(%metrics_addr, "Metrics server started");
            Some(handle)
        } else {
            None
        };

        // ── 6. Handler ───────────────────────────────────────────
        let router = QueueRouter::new(config.queue.key.clone(), config.queue.shards);
        let handler = Arc::new(Handler::new(
            config.mode,
            router,
            Arc::clone(&backend),
            metrics,
        ));

        // ── 7. Scribe server ─────────────────────────────────────
        let listener = TcpListener::bind(scribe_addr).await?;
        let shutdown = CancellationToken::new();
        let server = ScribeServer::new(handler).max_frame_bytes(config.max_frame_bytes);
        let server_handle = tokio::spawn(server.serve(listener, shutdown.clone()));

        shutdown_signal().await;

        // ── 8. Shutdown ──────────────────────────────────────────
        shutdown.cancel();
        match server_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Scribe server error"),
            Err(e) => error!(error = %e, "Scribe server task failed"),
        }
        if let Err(e) = backend.shutdown().await {
            error!(error = %e, backend = backend.name(), "Backend shutdown failed");
        }
        if let Some(handle) = metrics_handle {
            handle.abort();
        }
        info!("scriber shutdown complete");

        Ok(())
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the queue backend selected by config.
fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn QueueBackend>> {
    let backend: Arc<dyn QueueBackend> = match config.backend {
        BackendKind::Redis => Arc::new(RedisQueue::new(config.redis.clone())?),
        BackendKind::Memory => Arc::new(MemoryQueue::new()),
    };
    Ok(backend)
}

/// Initialise the tracing subscriber based on config.
fn init_tracing(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.log_format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
