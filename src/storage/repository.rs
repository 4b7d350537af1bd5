use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::model::{ConsentRecord, SessionDocument, SessionStatus, VerificationSession};

/// Backend of record for sessions, consent and documents
///
/// Every mutating operation is idempotent by key so callers may retry after
/// `PersistenceError::Unavailable`.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a session. Re-inserting the same session id is a no-op.
    async fn create_session(&self, session: &VerificationSession) -> Result<(), PersistenceError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<VerificationSession>, PersistenceError>;

    /// Apply a status change, refusing non-monotonic transitions
    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<VerificationSession, PersistenceError>;

    /// Store the consent for the current attempt and derive the session flags from it
    async fn save_consent(
        &self,
        session_id: &str,
        consent: &ConsentRecord,
    ) -> Result<VerificationSession, PersistenceError>;

    async fn get_consent(&self, session_id: &str) -> Result<Option<ConsentRecord>, PersistenceError>;

    async fn list_documents(&self, session_id: &str) -> Result<Vec<SessionDocument>, PersistenceError>;

    /// Make `document` the current entry for its (session, type), returning what it superseded
    async fn replace_document(
        &self,
        document: &SessionDocument,
    ) -> Result<Option<SessionDocument>, PersistenceError>;
}

#[derive(Default)]
struct Tables {
    sessions: HashMap<String, VerificationSession>,
    consents: HashMap<String, ConsentRecord>,
    documents: HashMap<String, Vec<SessionDocument>>,
}

/// Process-local repository
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_session(&self, session: &VerificationSession) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().await;

        if tables.sessions.contains_key(&session.session_id) {
            debug!("Session {} already exists", session.session_id);
            return Ok(());
        }

        // One non-terminal session per subject
        let open = tables
            .sessions
            .values()
            .find(|s| s.subject_id == session.subject_id && !s.status.is_terminal());
        if let Some(open) = open {
            return Err(PersistenceError::Conflict(format!(
                "subject {} already has open session {}",
                session.subject_id, open.session_id
            )));
        }

        info!(
            "Created session {} for subject {} ({})",
            session.session_id, session.subject_id, session.status
        );
        tables
            .sessions
            .insert(session.session_id.clone(), session.clone());

        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<VerificationSession>, PersistenceError> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.get(session_id).cloned())
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<VerificationSession, PersistenceError> {
        let mut tables = self.tables.write().await;
        let session = tables
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PersistenceError::NotFound(session_id.to_string()))?;

        if !session.status.can_transition_to(status) {
            return Err(PersistenceError::Conflict(format!(
                "session {} cannot move from {} to {}",
                session_id, session.status, status
            )));
        }

        if session.status != status {
            info!("Session {}: {} -> {}", session_id, session.status, status);
            session.status = status;
            session.updated_at = Utc::now();
        }

        Ok(session.clone())
    }

    async fn save_consent(
        &self,
        session_id: &str,
        consent: &ConsentRecord,
    ) -> Result<VerificationSession, PersistenceError> {
        let mut tables = self.tables.write().await;
        let session = tables
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PersistenceError::NotFound(session_id.to_string()))?;

        if session.status.is_terminal() {
            return Err(PersistenceError::Conflict(format!(
                "session {} is {}",
                session_id, session.status
            )));
        }

        session.consent_given = consent.consent_given();
        session.recording_consent = consent.recording_consent();
        session.updated_at = Utc::now();
        let updated = session.clone();

        tables
            .consents
            .insert(session_id.to_string(), consent.clone());

        Ok(updated)
    }

    async fn get_consent(&self, session_id: &str) -> Result<Option<ConsentRecord>, PersistenceError> {
        let tables = self.tables.read().await;
        Ok(tables.consents.get(session_id).cloned())
    }

    async fn list_documents(&self, session_id: &str) -> Result<Vec<SessionDocument>, PersistenceError> {
        let tables = self.tables.read().await;
        Ok(tables.documents.get(session_id).cloned().unwrap_or_default())
    }

    async fn replace_document(
        &self,
        document: &SessionDocument,
    ) -> Result<Option<SessionDocument>, PersistenceError> {
        let mut tables = self.tables.write().await;

        if !tables.sessions.contains_key(&document.session_id) {
            return Err(PersistenceError::NotFound(document.session_id.clone()));
        }

        let docs = tables
            .documents
            .entry(document.session_id.clone())
            .or_default();

        // Replaying the same document id is a no-op
        if docs.iter().any(|d| d.id == document.id) {
            return Ok(None);
        }

        let superseded = docs
            .iter()
            .position(|d| d.document_type == document.document_type)
            .map(|idx| docs.remove(idx));
        docs.push(document.clone());

        Ok(superseded)
    }
}
