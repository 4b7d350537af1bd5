use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Room for a base64-encoded document at the 10MB limit plus its JSON envelope
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/:session_id", get(handlers::get_session))
        .route("/sessions/:session_id/consent", post(handlers::accept_consent))
        // Live call
        .route("/sessions/:session_id/media/start", post(handlers::start_media))
        .route(
            "/sessions/:session_id/media/connect",
            post(handlers::connect_media),
        )
        .route(
            "/sessions/:session_id/media/tracks",
            post(handlers::toggle_track),
        )
        .route(
            "/sessions/:session_id/recording/start",
            post(handlers::start_recording),
        )
        .route(
            "/sessions/:session_id/recording/stop",
            post(handlers::stop_recording),
        )
        // Documents and review
        .route(
            "/sessions/:session_id/documents/proceed",
            post(handlers::proceed_to_documents),
        )
        .route(
            "/sessions/:session_id/documents",
            post(handlers::upload_document),
        )
        .route("/sessions/:session_id/review", post(handlers::proceed_to_review))
        .route("/sessions/:session_id/submit", post(handlers::submit))
        .route("/sessions/:session_id/cancel", post(handlers::cancel))
        // Scheduling
        .route("/schedule", post(handlers::schedule))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
