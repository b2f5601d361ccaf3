//! docflow server: HTTP adapter over `docflow-core`.
//!
//! Provides:
//! - REST endpoints for capabilities, routing, resolution and tasks via axum
//! - a JSON-RPC 2.0 endpoint backed by the core `RpcRouter`
//! - server-sent events for pipeline progress
//!
//! The server can also be embedded: build an `AppState` yourself and call
//! [`start_server_with_state`].

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use docflow_core::config::{DocflowConfig, ServerSection};
use docflow_core::{AppState, AppStateInner, Database};

/// Listener configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSection::default())
    }
}

impl From<&ServerSection> for ServerConfig {
    fn from(section: &ServerSection) -> Self {
        Self {
            host: section.host.clone(),
            port: section.port,
            db_path: section.db_path.clone(),
        }
    }
}

/// Install the global tracing subscriber (`RUST_LOG` overrides the default).
/// Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docflow_core=info,docflow_server=info,tower_http=info".into()),
        )
        .try_init();
}

/// Open the database, wire the core and run startup registration and
/// recovery.
pub async fn create_app_state(config: DocflowConfig) -> Result<AppState, String> {
    let db = Database::open(&config.server.db_path)
        .map_err(|e| format!("Failed to open database: {}", e))?;

    let state: AppState = Arc::new(
        AppStateInner::new(db, config)
            .map_err(|e| format!("Failed to build application state: {}", e))?,
    );

    state
        .initialize()
        .await
        .map_err(|e| format!("Failed to initialize: {}", e))?;

    Ok(state)
}

/// Start the server from a full config.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: DocflowConfig) -> Result<SocketAddr, String> {
    init_tracing();

    tracing::info!(
        "Starting docflow server on {}:{}",
        config.server.host,
        config.server.port
    );

    let server_config = ServerConfig::from(&config.server);
    let state = create_app_state(config).await?;

    start_server_with_state(server_config, state).await
}

/// The complete application router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server with a pre-built `AppState`.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("docflow server listening on {}", local_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "docflow-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
