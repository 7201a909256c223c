//! HTTP surface.
//!
//! - `POST /upload-link`: upload grant for a new audio file
//! - `GET /status/{fileKey}`: processing status for polling clients
//! - `POST /events`: object-created notifications
//! - `POST /objects`, `GET /objects/{key}`: the local bucket's grant endpoints

pub mod handlers;
pub mod request_id;
pub mod state;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::config::Settings;
use handlers::{
    download_object_handler, events_handler, health_handler, missing_file_key_handler,
    status_handler, upload_link_handler, upload_object_handler,
};
pub use request_id::{request_id_middleware, RequestId, REQUEST_ID_HEADER};
pub use state::{AppState, BackgroundJobs};

/// Room for the grant fields around the file in a form upload
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let upload_limit = usize::try_from(state.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health_handler))
        .route("/upload-link", post(upload_link_handler))
        .route("/status", get(missing_file_key_handler))
        .route("/status/{*file_key}", get(status_handler))
        .route("/events", post(events_handler))
        .route(
            "/objects",
            post(upload_object_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/objects/{*key}", get(download_object_handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

/// Serve until ctrl-c
pub async fn serve(settings: &Settings) -> Result<()> {
    let state = AppState::from_settings(settings).await?;
    let jobs = state.jobs.clone();
    let router = create_router(state);

    let listener = TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.bind))?;
    info!(
        addr = %settings.server.bind,
        bucket = %settings.bucket,
        "Listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    jobs.drain().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
