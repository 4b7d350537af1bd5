use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;

use crate::error::{
    PersistenceError, RecordingError, SchedulingError, SessionError, UploadError,
};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
}

/// Failures surfaced by the HTTP shell
#[derive(Debug)]
pub enum ApiError {
    Session(SessionError),
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError::Session(e)
    }
}

impl From<SchedulingError> for ApiError {
    fn from(e: SchedulingError) -> Self {
        ApiError::Session(e.into())
    }
}

fn persistence_status(e: &PersistenceError) -> StatusCode {
    match e {
        PersistenceError::NotFound(_) => StatusCode::NOT_FOUND,
        PersistenceError::Conflict(_) => StatusCode::CONFLICT,
        PersistenceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn status_for(e: &SessionError) -> StatusCode {
    match e {
        SessionError::Consent(_) => StatusCode::BAD_REQUEST,
        SessionError::Device(_) | SessionError::Signaling(_) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Upload(e) => match e {
            UploadError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::EmptyFile => StatusCode::BAD_REQUEST,
            UploadError::UploadFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            UploadError::Persistence(e) => persistence_status(e),
        },
        SessionError::Recording(e) => match e {
            RecordingError::ConsentRequired => StatusCode::BAD_REQUEST,
            RecordingError::MediaUnavailable => StatusCode::CONFLICT,
            RecordingError::SinkFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        },
        SessionError::Persistence(e) => persistence_status(e),
        SessionError::Scheduling(SchedulingError::SlotUnavailable(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SessionError::Scheduling(SchedulingError::Collaborator(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SessionError::RequiredDocumentsMissing(_) | SessionError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Session(e) => (
                status_for(&e),
                ErrorResponse {
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                },
            ),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: format!("{} not found", what),
                    retryable: false,
                },
            ),
            ApiError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: reason,
                    retryable: false,
                },
            ),
            ApiError::Unavailable(reason) => {
                error!("Service unavailable: {}", reason);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse {
                        error: reason,
                        retryable: true,
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
