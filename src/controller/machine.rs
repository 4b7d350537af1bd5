use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::context::SessionContext;
use super::step::{Edge, SessionAction, Step};
use crate::consent::ConsentManager;
use crate::documents::DocumentIntake;
use crate::error::{PersistenceError, RecordingError, SessionError};
use crate::media::{CaptureConstraints, ConnectionStatus, MediaSessionManager, MediaState};
use crate::model::{DocumentSet, DocumentType, SessionDocument, SessionStatus, VerificationSession};
use crate::recording::{RecordingManager, RecordingState};
use crate::review::ReviewAggregator;
use crate::storage::Repository;

/// Serializable snapshot of one attempt
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub step: Step,
    pub status: SessionStatus,
    pub consent_given: bool,
    pub recording_consent: bool,
    pub media: MediaState,
    pub recording: RecordingState,
    pub documents: Vec<SessionDocument>,
    pub missing_documents: Vec<DocumentType>,
}

impl SessionView {
    /// Rebuild the view of an attempt from what was persisted, for sessions
    /// that no longer have an open controller
    pub async fn archived(
        repository: &dyn Repository,
        session_id: &str,
    ) -> Result<Self, SessionError> {
        let session = repository
            .get_session(session_id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(session_id.to_string()))?;
        let consent = repository
            .get_consent(session_id)
            .await?
            .filter(|record| record.consent_given());
        let set = DocumentSet::from_documents(repository.list_documents(session_id).await?);
        let consent_given = consent.is_some();

        Ok(Self {
            step: Step::resume_from(session.status, consent_given),
            status: session.status,
            consent_given,
            recording_consent: consent.is_some_and(|record| record.recording_consent()),
            media: MediaState {
                status: ConnectionStatus::Closed,
                has_local_stream: false,
                has_remote_stream: false,
                audio_enabled: false,
                video_enabled: false,
            },
            recording: RecordingState {
                active: false,
                started_at: None,
                segments_written: 0,
                sink_failed: false,
            },
            documents: DocumentType::ALL
                .iter()
                .filter_map(|t| set.get(*t).cloned())
                .collect(),
            missing_documents: set.missing_required(),
            session_id: session.session_id,
        })
    }
}

/// Finite-state machine driving one verification attempt
///
/// Every action takes `&mut self`, so a transition (including an awaited
/// handshake or upload) resolves before the next action is looked at.
pub struct SessionController {
    session: VerificationSession,
    step: Step,
    repository: Arc<dyn Repository>,
    consent: Arc<ConsentManager>,
    media: Arc<MediaSessionManager>,
    recording: RecordingManager,
    documents: Arc<DocumentIntake>,
    review: ReviewAggregator,
    constraints: CaptureConstraints,
    /// Documents as they stood when the attempt ended
    closed_documents: Option<DocumentSet>,
}

impl SessionController {
    /// Create the session if needed and resume from its persisted status
    pub async fn open(ctx: SessionContext) -> Result<Self, SessionError> {
        let SessionContext {
            session,
            repository,
            blobs,
            documents,
            media,
            recording,
            capture,
            peer,
            signaling,
        } = ctx;
        let session_id = session.session_id.clone();

        repository.create_session(&session).await?;
        let session = repository
            .get_session(&session_id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(session_id.clone()))?;

        let consent = Arc::new(ConsentManager::new(&session_id, Arc::clone(&repository)));
        if let Some(record) = repository.get_consent(&session_id).await? {
            consent.restore(record);
        }

        let step = Step::resume_from(session.status, consent.consent_given());
        info!(
            "Session {} opened at step {:?} (status {})",
            session_id, step, session.status
        );

        let mut closed_documents = None;
        if matches!(step, Step::Documents | Step::Review | Step::Complete) {
            let set = documents.refresh(&session_id).await?;
            if !set.is_empty() {
                info!("Session {} resumed with {} documents", session_id, set.len());
            }
            if step.is_terminal() {
                documents.forget(&session_id);
                closed_documents = Some(set);
            }
        }

        let constraints = media.constraints.clone();
        let media = Arc::new(MediaSessionManager::new(
            &session_id,
            media,
            capture,
            peer,
            signaling,
        ));
        let recording = RecordingManager::new(
            recording,
            Arc::clone(&consent),
            Arc::clone(&media),
            blobs,
        );
        let review = ReviewAggregator::new(Arc::clone(&repository), Arc::clone(&documents));

        Ok(Self {
            session,
            step,
            repository,
            consent,
            media,
            recording,
            documents,
            review,
            constraints,
            closed_documents,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn session(&self) -> &VerificationSession {
        &self.session
    }

    pub fn media(&self) -> &Arc<MediaSessionManager> {
        &self.media
    }

    pub fn recording(&self) -> &RecordingManager {
        &self.recording
    }

    /// Ended and the outcome is persisted; nothing further can change this attempt
    pub fn is_finished(&self) -> bool {
        self.step.is_terminal()
            && matches!(
                self.session.status,
                SessionStatus::PendingReview
                    | SessionStatus::Approved
                    | SessionStatus::Rejected
                    | SessionStatus::Cancelled
            )
    }

    /// Release media without touching the persisted status, for a controller
    /// that is being discarded
    pub async fn close(&self) {
        self.run_exit_hook().await;
    }

    /// Apply one user action and return the step the machine ends up in
    pub async fn handle(&mut self, action: SessionAction) -> Result<Step, SessionError> {
        let name = action.name();

        if self.step == Step::Cancelled && matches!(action, SessionAction::Cancel) {
            if self.session.status != SessionStatus::Cancelled {
                // A forced cancel could not persist its status earlier
                self.session = self
                    .repository
                    .update_status(self.session_id(), SessionStatus::Cancelled)
                    .await?;
                info!("Session {}: cancelled status persisted", self.session_id());
            } else {
                debug!("Session {} already cancelled", self.session_id());
            }
            return Ok(self.step);
        }

        if !action.accepted_in(self.step) {
            warn!(
                "Session {}: {} not accepted in step {:?}",
                self.session_id(),
                name,
                self.step
            );
            return Err(SessionError::InvalidTransition {
                step: self.step,
                action: name,
            });
        }

        debug!("Session {}: {} in step {:?}", self.session_id(), name, self.step);

        match self.apply(action).await {
            Ok(()) => Ok(self.step),
            Err(e) if e.is_terminal() => {
                error!(
                    "Session {}: {} hit an integrity conflict, cancelling: {}",
                    self.session_id(),
                    name,
                    e
                );
                self.force_cancel().await;
                Err(e)
            }
            Err(e) => {
                warn!("Session {}: {} failed: {}", self.session_id(), name, e);
                Err(e)
            }
        }
    }

    async fn apply(&mut self, action: SessionAction) -> Result<(), SessionError> {
        let name = action.name();

        match action {
            SessionAction::AcceptConsent(record) => {
                self.session = self.consent.accept(record).await?;
                if self.session.status == SessionStatus::Scheduled {
                    self.session = self
                        .repository
                        .update_status(self.session_id(), SessionStatus::InProgress)
                        .await?;
                }
                if !self.consent.consent_given() {
                    return Err(self.rejected(name));
                }
                self.advance(Edge::ConsentAccepted, name)
            }

            SessionAction::StartMedia => {
                self.media.acquire_local_capture(&self.constraints).await?;
                self.advance(Edge::CaptureAcquired, name)
            }

            SessionAction::Connect => {
                self.media.initiate_signaling().await?;
                if self.media.status() != ConnectionStatus::Connected {
                    return Err(self.rejected(name));
                }
                self.advance(Edge::PeerConnected, name)
            }

            SessionAction::ToggleTrack { kind, enabled } => {
                self.media.set_local_track_enabled(kind, enabled).await;
                Ok(())
            }

            SessionAction::StartRecording => {
                self.recording.start().await?;
                Ok(())
            }

            SessionAction::StopRecording => {
                if let Some(summary) = self.recording.stop().await? {
                    info!(
                        "Session {}: recording stopped after {:.1}s ({} segments)",
                        self.session_id(),
                        summary.duration_secs,
                        summary.segments.len()
                    );
                    if let Some(reason) = summary.failure {
                        return Err(RecordingError::SinkFailed(reason).into());
                    }
                }
                Ok(())
            }

            SessionAction::ProceedToDocuments => {
                self.documents.refresh(self.session_id()).await?;
                self.advance(Edge::ProceedToDocuments, name)
            }

            SessionAction::UploadDocument {
                document_type,
                file,
                progress,
            } => {
                let session_id = self.session.session_id.clone();
                self.documents
                    .upload(&session_id, file, document_type, progress.as_ref())
                    .await?;
                Ok(())
            }

            SessionAction::ProceedToReview => {
                self.require_documents().await?;
                self.advance(Edge::DocumentsSatisfied, name)
            }

            SessionAction::Submit => {
                // Guard before any side effect
                self.require_documents().await?;
                self.run_exit_hook().await;
                let session_id = self.session.session_id.clone();
                self.session = self.review.submit(&session_id).await?;
                self.advance(Edge::Submitted, name)
            }

            SessionAction::Cancel => {
                self.run_exit_hook().await;
                self.session = self
                    .repository
                    .update_status(self.session_id(), SessionStatus::Cancelled)
                    .await?;
                self.advance(Edge::Cancelled, name)
            }
        }
    }

    async fn require_documents(&self) -> Result<(), SessionError> {
        let set = self.documents.refresh(self.session_id()).await?;
        let missing = set.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SessionError::RequiredDocumentsMissing(missing))
        }
    }

    fn rejected(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            step: self.step,
            action,
        }
    }

    fn advance(&mut self, edge: Edge, action: &'static str) -> Result<(), SessionError> {
        let next = self.step.next(edge).ok_or_else(|| self.rejected(action))?;
        info!(
            "Session {}: {:?} -> {:?}",
            self.session_id(),
            self.step,
            next
        );
        self.step = next;
        if next.is_terminal() {
            self.release_documents();
        }
        Ok(())
    }

    /// Keep a final snapshot for the view and drop the shared per-session state
    fn release_documents(&mut self) {
        if self.closed_documents.is_none() {
            let session_id = self.session.session_id.clone();
            self.closed_documents = Some(self.documents.current_documents(&session_id));
            self.documents.forget(&session_id);
        }
    }

    /// Stop recording, then tear media down. Runs on every exit edge.
    async fn run_exit_hook(&self) {
        match self.recording.stop().await {
            Ok(Some(summary)) if summary.is_complete() => info!(
                "Session {}: recording closed with {} segments",
                self.session_id(),
                summary.segments.len()
            ),
            Ok(Some(summary)) => error!(
                "Session {}: recording closed with {} segments after a storage failure: {}",
                self.session_id(),
                summary.segments.len(),
                summary.failure.unwrap_or_default()
            ),
            Ok(None) => {}
            Err(e) => error!(
                "Session {}: recording did not flush cleanly: {}",
                self.session_id(),
                e
            ),
        }
        self.media.teardown().await;
    }

    async fn force_cancel(&mut self) {
        self.run_exit_hook().await;

        match self
            .repository
            .update_status(self.session_id(), SessionStatus::Cancelled)
            .await
        {
            Ok(session) => self.session = session,
            Err(e) => warn!(
                "Session {}: cancelled locally, status not persisted: {}",
                self.session_id(),
                e
            ),
        }

        info!("Session {}: {:?} -> Cancelled", self.session_id(), self.step);
        self.step = Step::Cancelled;
        self.release_documents();
    }

    pub async fn view(&self) -> SessionView {
        let set = match &self.closed_documents {
            Some(set) => set.clone(),
            None => self.documents.current_documents(self.session_id()),
        };
        let documents: Vec<SessionDocument> = DocumentType::ALL
            .iter()
            .filter_map(|t| set.get(*t).cloned())
            .collect();

        SessionView {
            session_id: self.session.session_id.clone(),
            step: self.step,
            status: self.session.status,
            consent_given: self.consent.consent_given(),
            recording_consent: self.consent.recording_consent(),
            media: self.media.state().await,
            recording: self.recording.state().await,
            documents,
            missing_documents: set.missing_required(),
        }
    }
}
