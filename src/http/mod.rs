//! HTTP API for the calling shell
//!
//! Each route forwards one user action into the session's controller:
//! - POST /sessions - Open a new or scheduled session
//! - GET /sessions/:id - Current step, status, media, recording and documents
//! - POST /sessions/:id/{consent,media/*,recording/*,documents*,review,submit,cancel}
//! - POST /schedule - Book a future slot
//! - GET /health - Health check

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{status_for, ApiError, ErrorResponse};
pub use routes::create_router;
pub use state::{AppState, SessionFactory, SignalingMode};
