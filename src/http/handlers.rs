use super::error::ApiError;
use super::state::AppState;
use crate::controller::{SessionAction, SessionController, SessionView, Step};
use crate::documents::DocumentFile;
use crate::error::{PersistenceError, SessionError};
use crate::media::MediaKind;
use crate::model::{
    ConsentRecord, DocumentType, SessionStatus, VerificationSession, VerificationTier,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use base64::Engine;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Subject of a new attempt
    pub subject_id: Option<String>,

    /// Verification tier granted on completion (default: 3)
    pub tier: Option<u8>,

    /// Existing session to open instead, e.g. one booked through /schedule
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleTrackRequest {
    pub kind: MediaKind,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadDocumentRequest {
    pub document_type: DocumentType,
    pub name: String,
    pub mime_type: String,
    pub content_base64: String,
}

#[derive(Debug, Serialize)]
pub struct UploadDocumentResponse {
    /// Percentages reported while the upload ran
    pub progress: Vec<u8>,
    pub session: SessionView,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub subject_id: String,
    pub tier: Option<u8>,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

fn tier(requested: Option<u8>) -> VerificationTier {
    requested.map(VerificationTier).unwrap_or_default()
}

/// View of a session whose attempt has ended and whose controller is gone
async fn finished_view(state: &AppState, session_id: &str) -> Result<SessionView, ApiError> {
    let view = SessionView::archived(state.factory.repository.as_ref(), session_id)
        .await
        .map_err(|e| match e {
            SessionError::Persistence(PersistenceError::NotFound(_)) => {
                ApiError::NotFound(format!("Session {}", session_id))
            }
            e => ApiError::Session(e),
        })?;

    if view.step.is_terminal() {
        Ok(view)
    } else {
        Err(ApiError::NotFound(format!("Open session {}", session_id)))
    }
}

async fn dispatch(
    state: &AppState,
    session_id: &str,
    action: SessionAction,
) -> Result<Json<SessionView>, ApiError> {
    let Some(controller) = state.controller(session_id).await else {
        let view = finished_view(state, session_id).await?;
        return Err(ApiError::Session(SessionError::InvalidTransition {
            step: view.step,
            action: action.name(),
        }));
    };

    let mut guard = controller.lock().await;
    let result = guard.handle(action).await;
    let finished = guard.is_finished();
    let view = guard.view().await;
    drop(guard);

    if finished {
        state.evict(session_id, &controller).await;
    }

    result?;
    Ok(Json(view))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions
/// Open a controller for a new or previously booked session
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = match (req.session_id, req.subject_id) {
        (Some(session_id), _) => {
            if let Some(existing) = state.controller(&session_id).await {
                let view = existing.lock().await.view().await;
                return Ok((StatusCode::OK, Json(view)));
            }
            let session = state
                .factory
                .repository
                .get_session(&session_id)
                .await
                .map_err(|e| ApiError::Session(e.into()))?
                .ok_or_else(|| ApiError::NotFound(format!("Session {}", session_id)))?;
            if session.status.is_terminal() || session.status == SessionStatus::PendingReview {
                let view = finished_view(&state, &session_id).await?;
                return Ok((StatusCode::OK, Json(view)));
            }
            session
        }
        (None, Some(subject_id)) => VerificationSession::new(subject_id, tier(req.tier)),
        (None, None) => {
            return Err(ApiError::BadRequest(
                "subject_id or session_id is required".to_string(),
            ))
        }
    };

    let session_id = session.session_id.clone();
    info!("Opening session {} for subject {}", session_id, session.subject_id);

    let ctx = state
        .factory
        .context(session)
        .await
        .map_err(|e| ApiError::Unavailable(format!("{:#}", e)))?;
    let controller = SessionController::open(ctx).await?;
    let view = controller.view().await;

    let (registered, duplicate) = state.register(&session_id, controller).await;
    if let Some(duplicate) = duplicate {
        debug!("Session {} was opened concurrently, keeping the first", session_id);
        duplicate.close().await;
        let view = registered.lock().await.view().await;
        return Ok((StatusCode::OK, Json(view)));
    }

    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let view = match state.controller(&session_id).await {
        Some(controller) => controller.lock().await.view().await,
        None => finished_view(&state, &session_id).await?,
    };
    Ok(Json(view))
}

/// POST /sessions/:session_id/consent
pub async fn accept_consent(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(record): Json<ConsentRecord>,
) -> Result<Json<SessionView>, ApiError> {
    dispatch(&state, &session_id, SessionAction::AcceptConsent(record)).await
}

/// POST /sessions/:session_id/media/start
pub async fn start_media(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    dispatch(&state, &session_id, SessionAction::StartMedia).await
}

/// POST /sessions/:session_id/media/connect
pub async fn connect_media(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    dispatch(&state, &session_id, SessionAction::Connect).await
}

/// POST /sessions/:session_id/media/tracks
pub async fn toggle_track(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ToggleTrackRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let action = SessionAction::ToggleTrack {
        kind: req.kind,
        enabled: req.enabled,
    };
    dispatch(&state, &session_id, action).await
}

/// POST /sessions/:session_id/recording/start
pub async fn start_recording(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    dispatch(&state, &session_id, SessionAction::StartRecording).await
}

/// POST /sessions/:session_id/recording/stop
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    dispatch(&state, &session_id, SessionAction::StopRecording).await
}

/// POST /sessions/:session_id/documents/proceed
pub async fn proceed_to_documents(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    dispatch(&state, &session_id, SessionAction::ProceedToDocuments).await
}

/// POST /sessions/:session_id/documents
/// Upload a base64-encoded document
pub async fn upload_document(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<UploadDocumentRequest>,
) -> Result<Json<UploadDocumentResponse>, ApiError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.content_base64.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("content_base64 is not valid base64: {}", e)))?;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let action = SessionAction::UploadDocument {
        document_type: req.document_type,
        file: DocumentFile {
            name: req.name,
            mime_type: req.mime_type,
            bytes,
        },
        progress: Some(progress_tx),
    };

    let Json(session) = dispatch(&state, &session_id, action).await?;

    let mut progress = Vec::new();
    while let Ok(percent) = progress_rx.try_recv() {
        progress.push(percent);
    }

    Ok(Json(UploadDocumentResponse { progress, session }))
}

/// POST /sessions/:session_id/review
pub async fn proceed_to_review(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    dispatch(&state, &session_id, SessionAction::ProceedToReview).await
}

/// POST /sessions/:session_id/submit
pub async fn submit(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    dispatch(&state, &session_id, SessionAction::Submit).await
}

/// POST /sessions/:session_id/cancel
pub async fn cancel(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let view = dispatch(&state, &session_id, SessionAction::Cancel).await?;

    if view.step == Step::Cancelled {
        info!("Session {} cancelled", session_id);
    }

    Ok(view)
}

/// POST /schedule
/// Book a future slot
pub async fn schedule(
    State(state): State<AppState>,
    Json(req): Json<ScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .scheduling
        .propose_slot(&req.subject_id, tier(req.tier), req.date, req.time)
        .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
