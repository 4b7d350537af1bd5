use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::documents::DocumentFile;
use crate::media::MediaKind;
use crate::model::{ConsentRecord, DocumentType, SessionStatus};

/// Steps of a verification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Consent,
    Setup,
    Connecting,
    Verification,
    Documents,
    Review,
    Complete,
    Cancelled,
}

/// Edges of the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    ConsentAccepted,
    CaptureAcquired,
    PeerConnected,
    ProceedToDocuments,
    DocumentsSatisfied,
    Submitted,
    Cancelled,
}

impl Edge {
    /// Exit edges stop recording and tear media down before persisting
    pub fn runs_exit_hook(&self) -> bool {
        matches!(self, Edge::Submitted | Edge::Cancelled)
    }
}

impl Step {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Complete | Step::Cancelled)
    }

    /// Transition table. Guards are evaluated by the controller before an edge is taken.
    pub fn next(&self, edge: Edge) -> Option<Step> {
        use Step::*;

        match (self, edge) {
            (Consent, Edge::ConsentAccepted) => Some(Setup),
            (Setup, Edge::CaptureAcquired) => Some(Connecting),
            (Connecting, Edge::PeerConnected) => Some(Verification),
            (Verification, Edge::ProceedToDocuments) => Some(Documents),
            (Documents, Edge::DocumentsSatisfied) => Some(Review),
            (Review, Edge::Submitted) => Some(Complete),
            (Complete | Cancelled, Edge::Cancelled) => None,
            (_, Edge::Cancelled) => Some(Cancelled),
            _ => None,
        }
    }

    /// Where a restarted process picks up. Media cannot be resumed mid-call,
    /// so any live step restarts from Setup.
    pub fn resume_from(status: SessionStatus, consent_given: bool) -> Step {
        match status {
            SessionStatus::Scheduled | SessionStatus::InProgress if !consent_given => Step::Consent,
            SessionStatus::Scheduled | SessionStatus::InProgress => Step::Setup,
            SessionStatus::PendingReview | SessionStatus::Approved | SessionStatus::Rejected => {
                Step::Complete
            }
            SessionStatus::Cancelled => Step::Cancelled,
        }
    }
}

/// User actions forwarded by the calling shell
#[derive(Debug)]
pub enum SessionAction {
    AcceptConsent(ConsentRecord),
    StartMedia,
    Connect,
    ToggleTrack {
        kind: MediaKind,
        enabled: bool,
    },
    StartRecording,
    StopRecording,
    ProceedToDocuments,
    UploadDocument {
        document_type: DocumentType,
        file: DocumentFile,
        progress: Option<mpsc::UnboundedSender<u8>>,
    },
    ProceedToReview,
    Submit,
    Cancel,
}

impl SessionAction {
    pub fn name(&self) -> &'static str {
        match self {
            SessionAction::AcceptConsent(_) => "accept_consent",
            SessionAction::StartMedia => "start_media",
            SessionAction::Connect => "connect",
            SessionAction::ToggleTrack { .. } => "toggle_track",
            SessionAction::StartRecording => "start_recording",
            SessionAction::StopRecording => "stop_recording",
            SessionAction::ProceedToDocuments => "proceed_to_documents",
            SessionAction::UploadDocument { .. } => "upload_document",
            SessionAction::ProceedToReview => "proceed_to_review",
            SessionAction::Submit => "submit",
            SessionAction::Cancel => "cancel",
        }
    }

    pub fn accepted_in(&self, step: Step) -> bool {
        use Step::*;

        match self {
            SessionAction::AcceptConsent(_) => step == Consent,
            SessionAction::StartMedia => step == Setup,
            SessionAction::Connect => step == Connecting,
            SessionAction::ToggleTrack { .. } | SessionAction::StopRecording => !step.is_terminal(),
            SessionAction::StartRecording => matches!(step, Verification | Documents | Review),
            SessionAction::ProceedToDocuments => step == Verification,
            SessionAction::UploadDocument { .. } => matches!(step, Documents | Review),
            SessionAction::ProceedToReview => step == Documents,
            SessionAction::Submit => step == Review,
            SessionAction::Cancel => step != Complete,
        }
    }
}
