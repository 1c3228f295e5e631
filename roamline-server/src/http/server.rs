//! Axum server setup
//!
//! Layer order, innermost first:
//! 1. release guarantee (one session per request, finalized exactly once)
//! 2. panic catcher, outside the release layer so a panicking handler drops the
//!    guard and rolls back instead of committing a 500
//! 3. CORS, localhost-only by default
//! 4. tracing

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::identity::TrustedHeaderResolver;
use super::routes;
use super::state::AppState;
use crate::config::{ConfigError, ServerConfig};
use crate::db::{self, DbError};
use crate::rls::{HarnessConfig, PolicyHarness};
use crate::session::{release_guarantee, ConnectionSource, SessionManager};

/// Build the application router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let mut app = Router::new()
        .merge(routes::health::router())
        .merge(routes::trips::router())
        .merge(routes::destinations::router())
        .merge(routes::travel_details::router());

    if config.debug_routes {
        tracing::warn!("RLS debug routes enabled under /debug/rls - do not expose in production");
        app = app.merge(routes::rls_debug::router());
    }

    with_layers(app, state, config.cors_permissive)
}

pub(crate) fn with_layers<P: ConnectionSource>(
    app: Router<AppState<P>>,
    state: AppState<P>,
    cors_permissive: bool,
) -> Router {
    let cors = if cors_permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin([
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://localhost:3030"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
                HeaderValue::from_static("http://127.0.0.1:3030"),
            ])
            .allow_methods(Any)
            .allow_headers(Any)
    };

    app.layer(from_fn_with_state(
        state.sessions.clone(),
        release_guarantee::<P>,
    ))
    .layer(CatchPanicLayer::new())
    .layer(cors)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// Assemble state from a connected pool.
pub fn app_state(pool: PgPool, config: &ServerConfig) -> Result<AppState, ServerError> {
    let (user_header, claims_header) = config.header_names()?;
    let resolver = TrustedHeaderResolver::from_names(user_header, claims_header);
    let sessions = SessionManager::new(pool, config.acquire_timeout);
    let harness = PolicyHarness::new(&sessions, HarnessConfig::default());

    Ok(AppState::new(sessions, harness, Arc::new(resolver)))
}

/// Run the HTTP server.
///
/// # Example
///
/// ```ignore
/// let config = ServerConfig::from_env()?;
/// run_server(config).await?;
/// ```
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;

    let pool = db::create_pool_with_options(
        &config.database_url,
        config.max_connections,
        config.acquire_timeout,
    )
    .await?;

    if config.run_migrations {
        db::migrations::run(&pool).await?;
    }

    let state = app_state(pool.clone(), &config)?;
    let app = build_router(state, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        max_connections = config.max_connections,
        acquire_timeout_ms = config.acquire_timeout.as_millis() as u64,
        "Server listening on {}",
        config.bind_addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] DbError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
