use thiserror::Error;

use crate::controller::Step;
use crate::model::DocumentType;

/// Consent could not be accepted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsentError {
    #[error("Required consent clauses not accepted: {}", .0.join(", "))]
    Incomplete(Vec<&'static str>),

    #[error("Consent already accepted for this attempt")]
    AlreadyAccepted,
}

/// Local capture device failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Permission denied for capture device: {0}")]
    PermissionDenied(String),

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Peer connection negotiation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    #[error("Signaling handshake timed out after {0}s")]
    SignalingTimeout(u64),

    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Unsupported format {mime_type} for {document_type}")]
    UnsupportedFormat {
        document_type: DocumentType,
        mime_type: String,
    },

    #[error("File too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("File is empty")]
    EmptyFile,

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl UploadError {
    /// Validation failures need a different input; network failures can be retried as-is
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::UploadFailed(_) => true,
            UploadError::Persistence(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Repository failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Integrity conflict: {0}")]
    Conflict(String),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PersistenceError::Unavailable(_))
    }

    /// Integrity conflicts end the attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, PersistenceError::Conflict(_))
    }
}

/// Blob storage failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Blob write failed for {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Blob delete failed for {path}: {reason}")]
    DeleteFailed { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordingError {
    #[error("Recording requires video recording consent")]
    ConsentRequired,

    #[error("No media feed available to record")]
    MediaUnavailable,

    #[error("Recording sink failed: {0}")]
    SinkFailed(String),
}

/// Why a proposed slot was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRejection {
    Weekend,
    InPast,
    BeyondHorizon,
    Taken,
}

impl std::fmt::Display for SlotRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SlotRejection::Weekend => "falls on a weekend",
            SlotRejection::InPast => "is in the past",
            SlotRejection::BeyondHorizon => "is too far in the future",
            SlotRejection::Taken => "was rejected by the scheduler",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    #[error("Slot unavailable: slot {0}")]
    SlotUnavailable(SlotRejection),

    #[error("Scheduling collaborator failed: {0}")]
    Collaborator(String),
}

/// Every failure the session controller can surface to the calling shell
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Consent(#[from] ConsentError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("Required documents missing: {0:?}")]
    RequiredDocumentsMissing(Vec<DocumentType>),

    #[error("Action {action} not accepted in step {step:?}")]
    InvalidTransition { step: Step, action: &'static str },
}

impl SessionError {
    /// Whether repeating the same action (possibly after user remediation) can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Consent(_) => true,
            SessionError::Device(_) => true,
            SessionError::Signaling(_) => true,
            SessionError::Upload(e) => e.is_retryable(),
            SessionError::Recording(e) => !matches!(e, RecordingError::ConsentRequired),
            SessionError::Persistence(e) => e.is_retryable(),
            SessionError::Scheduling(e) => matches!(e, SchedulingError::Collaborator(_)),
            SessionError::RequiredDocumentsMissing(_) => true,
            SessionError::InvalidTransition { .. } => false,
        }
    }

    /// Integrity conflicts force the session into `Cancelled`
    pub fn is_terminal(&self) -> bool {
        match self {
            SessionError::Persistence(e) => e.is_terminal(),
            SessionError::Upload(UploadError::Persistence(e)) => e.is_terminal(),
            _ => false,
        }
    }
}
