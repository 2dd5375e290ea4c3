//! HTTP server setup and routing
//!
//! Sets up the Axum router for control endpoints and SSE streams.

use crate::error::{Error, Result};
use crate::library::DownloadRegistry;
use crate::playback::PlaybackEngine;
use axum::{
    routing::{delete, get, post},
    Router,
};
use cadence_common::events::EventBus;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<PlaybackEngine>,
    pub registry: Arc<DownloadRegistry>,
    pub events: Arc<EventBus>,
}

/// Build the router with all routes
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        // Playback
        .route("/player/status", get(super::handlers::get_status))
        .route("/player/command", post(super::handlers::command))
        .route("/player/play", post(super::handlers::play))
        .route("/player/seek", post(super::handlers::seek))
        .route("/player/volume", post(super::handlers::set_volume))
        .route("/player/speed", post(super::handlers::set_speed))
        .route("/player/quality", post(super::handlers::set_quality))
        // Output feedback
        .route("/player/progress", post(super::handlers::progress))
        .route("/player/ended", post(super::handlers::ended))
        .route("/player/error", post(super::handlers::output_error))
        // Queue
        .route("/player/queue", get(super::handlers::get_queue))
        .route("/player/queue", delete(super::handlers::clear_queue))
        .route("/player/queue/replace", post(super::handlers::replace_queue))
        .route("/player/queue/next", post(super::handlers::add_next))
        .route("/player/queue/remove", post(super::handlers::remove_from_queue))
        // Library
        .route("/library", get(super::handlers::get_library))
        .route("/library/add", post(super::handlers::library_add))
        .route("/library/remove", post(super::handlers::library_remove))
        // SSE
        .route("/events", get(super::sse::event_stream))
        .route("/host/notifications", get(super::sse::host_notifications))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run HTTP API server until `shutdown` resolves
pub async fn run<F>(port: u16, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(ctx);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
