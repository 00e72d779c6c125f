//! `VistaServer`: Axum HTTP + `WebSocket` listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use vista_core::Engine;
use vista_rpc::MethodRegistry;

use crate::config::ServerConfig;
use crate::context::BridgeContext;
use crate::errors::ServerError;
use crate::handlers;
use crate::health::{self, HealthResponse};
use crate::reporter::WebSocketReporter;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_session;
use crate::websocket::{ConnectionId, ConnectionRegistry};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Engine handle given to method handlers.
    pub context: Arc<BridgeContext>,
    /// Callable methods.
    pub handlers: Arc<MethodRegistry<BridgeContext>>,
    /// Open observer connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `/metrics`; `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Router serving only the observer endpoint at `config.api_path`.
///
/// Mount it into a host application's router to share its listener.
pub fn api_router(state: ApiState) -> Router {
    let path = state.config.api_path.clone();
    Router::new()
        .route(&path, get(ws_handler))
        .with_state(state)
}

/// The bridge server.
pub struct VistaServer {
    config: Arc<ServerConfig>,
    context: Arc<BridgeContext>,
    handlers: Arc<MethodRegistry<BridgeContext>>,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl VistaServer {
    /// Create a server over `engine` and register its reporter.
    ///
    /// Pass the handle from [`crate::metrics::install_recorder`] to serve
    /// `/metrics`.
    pub fn new(
        config: ServerConfig,
        engine: Arc<dyn Engine>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        engine.add_reporter(Arc::new(WebSocketReporter::new(
            Arc::clone(&registry),
            &engine,
        )));

        let mut methods = MethodRegistry::new();
        handlers::register_all(&mut methods);

        Self {
            config: Arc::new(config),
            context: Arc::new(BridgeContext::new(engine)),
            handlers: Arc::new(methods),
            registry,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// State shared by every route.
    pub fn state(&self) -> ApiState {
        ApiState {
            context: Arc::clone(&self.context),
            handlers: Arc::clone(&self.handlers),
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = self.state();
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state.clone())
            .merge(api_router(state))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in the background until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %err, "server terminated");
            }
        });

        info!(addr = %local_addr, api_path = %self.config.api_path, "vista server listening");
        Ok((local_addr, handle))
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the method registry.
    pub fn handlers(&self) -> &Arc<MethodRegistry<BridgeContext>> {
        &self.handlers
    }
}

/// GET `<api_path>`: upgrade to an observer session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let max_size = state.config.max_message_size;
    ws.max_message_size(max_size)
        .on_upgrade(move |socket| {
            let shutdown = Arc::clone(&state.shutdown);
            shutdown.track_session(run_session(socket, ConnectionId::new(), state))
        })
        .into_response()
}

/// GET /health
async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    let connections = state.registry.count().await;
    let files = state.context.engine.paths().len();
    Json(health::health_check(state.start_time, connections, files))
}

/// GET /metrics
async fn metrics_handler(State(state): State<ApiState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
