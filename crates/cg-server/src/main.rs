//! # ChatGate Server
//!
//! Real-time broadcast gateway: a WebSocket relay that fans every chat
//! message out to all open connections, plus an HTTP API gated by an
//! ordered origin → auth → body → log → dispatch → normalize pipeline.

mod api;
mod ws;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::api::auth::{CredentialVerifier, JwtVerifier};
use crate::api::origin::OriginPolicy;
use crate::ws::registry::ConnectionRegistry;
use crate::ws::relay::Relay;

/// Shared application state available to all handlers.
pub struct AppState {
    /// Pool handed to resource collaborators; the gateway itself never queries it.
    pub db: sqlx::PgPool,
    pub config: cg_common::AppConfig,
    pub origin: OriginPolicy,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub registry: Arc<ConnectionRegistry>,
    pub relay: Relay,
}

impl AppState {
    /// Build state with the JWT verifier configured from `config.auth`.
    pub fn new(config: cg_common::AppConfig, db: sqlx::PgPool) -> anyhow::Result<Self> {
        let verifier = Arc::new(JwtVerifier::new(&config.auth));
        Self::with_verifier(config, db, verifier)
    }

    pub fn with_verifier(
        config: cg_common::AppConfig,
        db: sqlx::PgPool,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> anyhow::Result<Self> {
        let origin = OriginPolicy::new(&config.cors.allowed_origin)?;
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Relay::new(registry.clone());

        Ok(Self {
            db,
            config,
            origin,
            verifier,
            registry,
            relay,
        })
    }
}

/// Assemble the HTTP API and the WebSocket endpoint into one router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/ws", ws::router(state.clone()))
        .merge(api::router(state))
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Load configuration
    let config = cg_common::AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .json()
        .init();

    tracing::info!(
        bind_address = %config.bind_address(),
        "Starting ChatGate server..."
    );

    // Connect to PostgreSQL
    let db = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Connected to database");

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), db)?);
    tracing::info!(allowed_origin = ?state.origin.allowed(), "Origin gate configured");

    let app = build_router(state.clone());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state.clone()))
    .await?;

    state.db.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM, then closes every open socket so
/// upgraded connections don't hold the server open.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    if state.registry.is_empty() {
        return;
    }
    let closed = state.registry.close_all();
    tracing::info!(closed, "Connection registry torn down");
}
