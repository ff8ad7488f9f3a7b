//! Iceberg REST server lifecycle.
//!
//! [`IcebergRestServer`] owns the catalog backend, the metrics report
//! manager and the HTTP listener:
//!
//! ```text
//! new(config) -> initialize() -> start() -> join() -> stop()
//! ```
//!
//! The outer router serves `/health`, `/ready`, `/metrics` and
//! `/prometheus/metrics`, and mounts the Iceberg REST API under `/iceberg`.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aurora_iceberg::backend::{CatalogBackend, CatalogError, MemoryBackend, SqliteBackend};
use aurora_iceberg::io::ResolvingFileIo;
use aurora_iceberg::metrics::serve_metrics;
use aurora_iceberg::metrics_manager::{IcebergMetricsManager, MetricsError};
use aurora_iceberg::{IcebergState, IcebergTableOps, iceberg_router};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, middleware};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::admission::{Admission, admission_middleware, header_limit_middleware};
use crate::config::{CatalogSettings, ServerConfig};
use crate::observability::server_span;

/// Service name used in logs.
pub const SERVICE_NAME: &str = "iceberg-rest";

/// Mount point of the Iceberg REST API.
pub const ICEBERG_PATH: &str = "/iceberg";

/// How long aborted requests get to release their slots on stop.
const ABORT_GRACE: Duration = Duration::from_secs(5);

/// Errors from the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` or `router` was called before `initialize`.
    #[error("iceberg-rest server is not initialized")]
    NotInitialized,

    /// `start` was called twice.
    #[error("iceberg-rest server is already started")]
    AlreadyStarted,

    /// The port is taken.
    #[error("Failed to start iceberg-rest web server on host {host} port {port}, which is already in use")]
    AddressInUse {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Any other bind or serve failure.
    #[error("Failed to start iceberg-rest web server: {0}")]
    Io(#[from] std::io::Error),

    /// The catalog backend could not be opened.
    #[error("failed to open catalog backend: {0}")]
    Backend(#[from] CatalogError),

    /// The metrics report manager could not be created.
    #[error("failed to create Iceberg metrics manager: {0}")]
    MetricsManager(#[from] MetricsError),

    /// The Prometheus recorder could not be installed.
    #[error("failed to install Prometheus recorder: {0}")]
    Prometheus(String),

    /// The serving task panicked or was cancelled.
    #[error("iceberg-rest web server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Always `ok`.
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    /// Whether the catalog backend answered.
    pub ready: bool,
    /// Failure detail when not ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Liveness: the process is serving requests.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness: the catalog backend answers a ping.
async fn ready(State(ops): State<Arc<IcebergTableOps>>) -> impl IntoResponse {
    match ops.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                message: Some(err.message().to_string()),
            }),
        ),
    }
}

/// Everything `initialize` builds.
struct Components {
    ops: Arc<IcebergTableOps>,
    metrics_manager: Arc<IcebergMetricsManager>,
    admission: Arc<Admission>,
    router: Router,
}

/// The standalone Iceberg REST catalog server.
pub struct IcebergRestServer {
    config: ServerConfig,
    components: Option<Components>,
    shutdown: CancellationToken,
    serve_task: Option<JoinHandle<std::io::Result<()>>>,
    local_addr: Option<SocketAddr>,
    stopped: bool,
}

impl std::fmt::Debug for IcebergRestServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcebergRestServer")
            .field("config", &self.config)
            .field("initialized", &self.components.is_some())
            .field("local_addr", &self.local_addr)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl IcebergRestServer {
    /// Creates a server; nothing is opened until [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            components: None,
            shutdown: CancellationToken::new(),
            serve_task: None,
            local_addr: None,
            stopped: false,
        }
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Opens the catalog backend, creates the metrics manager and builds
    /// the router. Calling it again has no effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened, the metrics
    /// manager settings are invalid, or the Prometheus recorder cannot be
    /// installed.
    pub fn initialize(&mut self) -> Result<(), ServerError> {
        if self.components.is_some() {
            return Ok(());
        }

        aurora_iceberg::metrics::init_metrics()
            .map_err(|e| ServerError::Prometheus(e.to_string()))?;

        let backend = open_backend(&self.config.catalog)?;
        let ops = Arc::new(IcebergTableOps::new(
            backend,
            Arc::new(ResolvingFileIo::new()),
            self.config.catalog.warehouse(),
        ));
        let metrics_manager = Arc::new(IcebergMetricsManager::new(&self.config.metrics)?);
        let admission = Arc::new(Admission::new(
            self.config.http.max_threads,
            self.config.http.work_queue_size,
        ));

        let state = IcebergState::with_config(
            Arc::clone(&ops),
            Arc::clone(&metrics_manager),
            self.config.iceberg_config(),
        );
        let router = create_router(&self.config, state, Arc::clone(&ops), Arc::clone(&admission));

        tracing::info!(
            backend = ops.backend_name(),
            warehouse = ops.warehouse(),
            prefix = ?self.config.prefix,
            "Initialized {SERVICE_NAME} server"
        );

        self.components = Some(Components {
            ops,
            metrics_manager,
            admission,
            router,
        });
        Ok(())
    }

    /// Returns the HTTP router without binding a port.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotInitialized`] before `initialize`.
    pub fn router(&self) -> Result<Router, ServerError> {
        self.components
            .as_ref()
            .map(|c| c.router.clone())
            .ok_or(ServerError::NotInitialized)
    }

    /// Table operations, once initialized.
    #[must_use]
    pub fn table_ops(&self) -> Option<Arc<IcebergTableOps>> {
        self.components.as_ref().map(|c| Arc::clone(&c.ops))
    }

    /// Token that begins graceful shutdown when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Address the server is bound to, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Starts the metrics manager, binds the listener and begins serving.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AddressInUse`] when the port is taken, or
    /// another error if the server is not initialized, already started, or
    /// cannot bind.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        let components = self.components.as_ref().ok_or(ServerError::NotInitialized)?;
        if self.serve_task.is_some() || self.stopped {
            return Err(ServerError::AlreadyStarted);
        }

        components.metrics_manager.start();

        let http = &self.config.http;
        let listener = match TcpListener::bind((http.host.as_str(), http.port)).await {
            Ok(listener) => listener,
            Err(source) if source.kind() == std::io::ErrorKind::AddrInUse => {
                let err = ServerError::AddressInUse {
                    host: http.host.clone(),
                    port: http.port,
                    source,
                };
                tracing::error!(error = %err.source_message(), "{err}");
                return Err(err);
            }
            Err(source) => {
                tracing::error!(error = %source, "Failed to start {SERVICE_NAME} web server");
                return Err(ServerError::Io(source));
            }
        };
        let local_addr = listener.local_addr()?;

        let span = server_span(SERVICE_NAME, &http.host, local_addr.port());
        let task = tokio::spawn(
            serve(
                listener,
                components.router.clone(),
                self.shutdown.clone(),
                http.stop_timeout,
            )
            .instrument(span),
        );

        tracing::warn!("Serving plain HTTP; terminate TLS in a reverse proxy");
        tracing::info!(
            "{SERVICE_NAME} web server started on host {} port {}",
            http.host,
            local_addr.port()
        );

        self.serve_task = Some(task);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Waits until the server stops serving.
    ///
    /// # Errors
    ///
    /// Returns an error if serving failed or the serving task panicked.
    pub async fn join(&mut self) -> Result<(), ServerError> {
        let Some(task) = self.serve_task.take() else {
            return Ok(());
        };
        task.await??;
        Ok(())
    }

    /// Stops serving, waits up to `stopTimeout` for in-flight requests,
    /// aborts the ones still running, then closes the catalog backend and
    /// drains the metrics queue.
    ///
    /// Safe to call more than once. Failures are logged, not returned.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.shutdown.cancel();

        if let Some(task) = self.serve_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(error = %err, "{SERVICE_NAME} web server exited with an error"),
                Err(err) => tracing::warn!(error = %err, "Failed to stop {SERVICE_NAME} web server"),
            }
        }

        let Some(components) = self.components.as_ref() else {
            return;
        };
        components.admission.close();
        // Connections outlive the serve task; cut off what is still running
        // before the backend goes away.
        components.admission.abort_in_flight();
        if !components.admission.wait_idle(ABORT_GRACE).await {
            tracing::warn!(
                running = components.admission.running(),
                "Requests still running after abort; closing catalog anyway"
            );
        }
        if let Some(addr) = self.local_addr {
            tracing::info!(
                "{SERVICE_NAME} web server stopped on host {} port {}",
                self.config.http.host,
                addr.port()
            );
        }
        if let Err(err) = components.ops.close().await {
            tracing::warn!(error = %err, "Failed to close catalog backend");
        }
        components.metrics_manager.close().await;
        tracing::info!("Iceberg REST service stopped");
    }
}

impl ServerError {
    fn source_message(&self) -> String {
        std::error::Error::source(self).map_or_else(String::new, ToString::to_string)
    }
}

fn open_backend(settings: &CatalogSettings) -> Result<Arc<dyn CatalogBackend>, ServerError> {
    match settings {
        CatalogSettings::Memory { .. } => Ok(Arc::new(MemoryBackend::new())),
        CatalogSettings::Jdbc(jdbc) => {
            if jdbc.user.is_some()
                || jdbc.password.is_some()
                || jdbc.driver.is_some()
                || !jdbc.connection_properties.is_empty()
            {
                tracing::info!("SQLite catalog ignores JDBC credentials, driver and connection properties");
            }
            Ok(Arc::new(SqliteBackend::open(&jdbc.uri, jdbc.initialize)?))
        }
    }
}

/// Builds the outer router.
///
/// Layers, outermost first: tracing, admission, header limit, request
/// timeout.
fn create_router(
    config: &ServerConfig,
    state: IcebergState,
    ops: Arc<IcebergTableOps>,
    admission: Arc<Admission>,
) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(ops)
        .route("/metrics", get(serve_metrics))
        .route("/prometheus/metrics", get(serve_metrics))
        .nest_service(ICEBERG_PATH, iceberg_router(state))
        .layer(TimeoutLayer::new(config.http.idle_timeout))
        .layer(middleware::from_fn_with_state(
            config.http.request_header_size,
            header_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(admission, admission_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serves until `shutdown` is cancelled, then gives in-flight requests
/// `stop_timeout` to finish.
async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
    stop_timeout: Duration,
) -> std::io::Result<()> {
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();

    tokio::select! {
        result = server => result,
        () = async {
            shutdown.cancelled().await;
            tokio::time::sleep(stop_timeout).await;
        } => {
            tracing::warn!(
                stop_timeout_ms = stop_timeout.as_millis(),
                "In-flight requests did not finish before stopTimeout"
            );
            Ok(())
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Runs the server until SIGINT or SIGTERM.
///
/// After a signal the server keeps serving for `server.shutdown.timeout`,
/// then stops.
///
/// # Errors
///
/// Returns an error if the server fails to initialize, start or serve.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let shutdown_timeout = config.shutdown_timeout;
    let mut server = IcebergRestServer::new(config);
    server.initialize()?;
    if let Err(err) = server.start().await {
        server.stop().await;
        return Err(err);
    }
    tracing::info!("Done, Aurora server started");

    let token = server.shutdown_token();
    tokio::spawn(async move {
        tokio::select! {
            () = shutdown_signal() => {
                tracing::info!(
                    wait_ms = shutdown_timeout.as_millis(),
                    "Shutdown signal received"
                );
                tokio::time::sleep(shutdown_timeout).await;
                token.cancel();
            }
            () = token.cancelled() => {}
        }
    });

    let joined = server.join().await;
    tracing::info!("Shutting down Aurora server");
    server.stop().await;
    tracing::info!("Aurora server has shut down");
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Properties;
    use anyhow::{Context, Result};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_config(extra: &str) -> Result<ServerConfig> {
        let props = Properties::parse(&format!("host=127.0.0.1\nhttpPort=9001\n{extra}"));
        Ok(ServerConfig::from_properties(&props)?)
    }

    fn initialized(extra: &str) -> Result<IcebergRestServer> {
        let mut server = IcebergRestServer::new(test_config(extra)?);
        server.initialize()?;
        Ok(server)
    }

    async fn get(router: Router, uri: &str) -> Result<(StatusCode, Vec<u8>)> {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .context("build request")?;
        let response = router.oneshot(request).await.map_err(|err| -> std::convert::Infallible { match err {} })?;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .context("read response body")?;
        Ok((status, body.to_vec()))
    }

    #[tokio::test]
    async fn test_health_endpoint() -> Result<()> {
        let server = initialized("")?;
        let (status, body) = get(server.router()?, "/health").await?;
        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = serde_json::from_slice(&body).context("parse JSON body")?;
        assert_eq!(health.status, "ok");
        Ok(())
    }

    #[tokio::test]
    async fn test_ready_endpoint() -> Result<()> {
        let server = initialized("")?;
        let (status, body) = get(server.router()?, "/ready").await?;
        assert_eq!(status, StatusCode::OK);
        let ready: ReadyResponse = serde_json::from_slice(&body).context("parse JSON body")?;
        assert!(ready.ready);
        assert!(ready.message.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_iceberg_config_is_mounted() -> Result<()> {
        let server = initialized("prefix=aurora")?;
        let (status, body) = get(server.router()?, "/iceberg/v1/config").await?;
        assert_eq!(status, StatusCode::OK);
        let config: serde_json::Value = serde_json::from_slice(&body).context("parse JSON body")?;
        assert_eq!(config["overrides"]["prefix"], "aurora");
        assert!(config.get("defaults").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_metrics_endpoints() -> Result<()> {
        let server = initialized("")?;
        for uri in ["/metrics", "/prometheus/metrics"] {
            let (status, _) = get(server.router()?, uri).await?;
            assert_eq!(status, StatusCode::OK, "{uri}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_headers_rejected() -> Result<()> {
        let server = initialized("requestHeaderSize=1024")?;
        let request = Request::builder()
            .uri("/iceberg/v1/config")
            .header("x-padding", "p".repeat(2048))
            .body(Body::empty())
            .context("build request")?;
        let response = server
            .router()?
            .oneshot(request)
            .await
            .map_err(|err| -> std::convert::Infallible { match err {} })?;
        assert_eq!(response.status(), StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
        Ok(())
    }

    #[tokio::test]
    async fn test_router_requires_initialize() -> Result<()> {
        let mut server = IcebergRestServer::new(test_config("")?);
        assert!(matches!(server.router(), Err(ServerError::NotInitialized)));
        assert!(matches!(server.start().await, Err(ServerError::NotInitialized)));
        Ok(())
    }

    #[tokio::test]
    async fn test_jdbc_backend_initializes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let extra = format!(
            "catalog-backend=jdbc\nuri=jdbc:sqlite:{}/catalog.db\nwarehouse={}/warehouse\n",
            dir.path().display(),
            dir.path().display()
        );
        let server = initialized(&extra)?;
        let ops = server.table_ops().context("table ops")?;
        assert_eq!(ops.backend_name(), "jdbc");
        let (status, _) = get(server.router()?, "/ready").await?;
        assert_eq!(status, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() -> Result<()> {
        let mut server = initialized("httpPort=9001")?;
        server.config.http.port = 0;
        let addr = server.start().await?;
        assert_ne!(addr.port(), 0);
        assert!(matches!(server.start().await, Err(ServerError::AlreadyStarted)));

        server.stop().await;
        server.stop().await;
        server.join().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_port_in_use_is_reported() -> Result<()> {
        let taken = std::net::TcpListener::bind("127.0.0.1:0")?;
        let port = taken.local_addr()?.port();

        let mut server = initialized("")?;
        server.config.http.port = port;
        let err = server.start().await.expect_err("port is taken");
        assert_eq!(
            err.to_string(),
            format!(
                "Failed to start iceberg-rest web server on host 127.0.0.1 port {port}, which is already in use"
            )
        );
        server.stop().await;
        Ok(())
    }
}
