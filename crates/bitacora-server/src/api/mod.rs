//! HTTP API
//!
//! Routes:
//! - `/`, `/api/...`: entries and backups
//! - `/setup...`: configuration and the Signal K access flow
//! - `/uploads/...`: stored photos
//!
//! Until setup has been saved once, everything outside `/setup` redirects
//! there.

mod entries;
mod extractors;
mod setup;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use bitacora_core::{ConfigStore, DataPaths, LogbookService, SignalKClient};

use types::ApiError;

/// Largest accepted request body (photos included)
const BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Everything the handlers need
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LogbookService>,
    pub config: Arc<ConfigStore>,
    pub signalk: Arc<SignalKClient>,
    pub paths: DataPaths,
}

impl AppState {
    /// Wire up the production services for `paths`
    pub fn open(paths: DataPaths) -> Result<Self> {
        paths.ensure()?;
        let config = Arc::new(ConfigStore::file(&paths));
        let signalk = Arc::new(SignalKClient::new(config.clone())?);
        let service = LogbookService::open(&paths, config.clone(), signalk.clone())
            .context("Failed to open logbook")?;

        Ok(Self {
            service: Arc::new(service),
            config,
            signalk,
            paths,
        })
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.paths.uploads_dir());

    Router::new()
        .route("/", get(entries::home))
        .route("/api/quick-note", post(entries::quick_note))
        .route("/api/entry", post(entries::create))
        .route(
            "/api/entry/{id}",
            put(entries::update).delete(entries::delete).get(entries::get),
        )
        .route("/api/entries", get(entries::list))
        .route("/api/backup", post(entries::backup))
        .route("/setup", get(setup::show))
        .route("/setup/save", post(setup::save))
        .route("/setup/signalk/request", post(setup::request_access))
        .route("/setup/signalk/check", post(setup::check_access))
        .route("/setup/signalk/test", post(setup::test_connection))
        .route("/setup/signalk/test-path", post(setup::test_path))
        .nest_service("/uploads", uploads)
        .layer(middleware::from_fn_with_state(state.clone(), setup_gate))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Redirect to `/setup` until setup is complete
async fn setup_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.uri().path().starts_with("/setup") {
        return next.run(request).await;
    }

    match state.config.load() {
        Ok(config) if config.setup_completed => next.run(request).await,
        Ok(_) => Redirect::to("/setup").into_response(),
        Err(e) => ApiError::from_config(e).into_response(),
    }
}

/// Serve until the process is stopped
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        %addr,
        data_dir = %state.paths.data_dir().display(),
        "Logbook listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
