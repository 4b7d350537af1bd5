//! Informed consent capture
//!
//! One `ConsentManager` lives for one attempt. It validates the clauses,
//! persists the accepted record, and answers the two gating questions asked by
//! the rest of the engine: may the session progress, and may it be recorded.

use chrono::Utc;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::error::{ConsentError, PersistenceError, SessionError};
use crate::model::{ConsentRecord, VerificationSession};
use crate::storage::Repository;

pub struct ConsentManager {
    session_id: String,
    repository: Arc<dyn Repository>,
    accepted: RwLock<Option<ConsentRecord>>,
}

impl ConsentManager {
    pub fn new(session_id: impl Into<String>, repository: Arc<dyn Repository>) -> Self {
        Self {
            session_id: session_id.into(),
            repository,
            accepted: RwLock::new(None),
        }
    }

    /// Restore a record accepted earlier in this attempt (process restart)
    pub fn restore(&self, record: ConsentRecord) {
        if record.consent_given() {
            if let Ok(mut accepted) = self.accepted.write() {
                *accepted = Some(record);
            }
        }
    }

    /// Validate and persist consent. Nothing is written when a required clause is missing.
    ///
    /// Replaying the record already accepted returns the stored session, so a
    /// caller whose follow-up write failed can retry the whole step.
    pub async fn accept(&self, mut record: ConsentRecord) -> Result<VerificationSession, SessionError> {
        if let Some(accepted) = self.accepted_record() {
            if !accepted.same_clauses(&record) {
                return Err(ConsentError::AlreadyAccepted.into());
            }
            debug!("Consent for session {} already accepted, replaying", self.session_id);
            let session = self
                .repository
                .get_session(&self.session_id)
                .await?
                .ok_or_else(|| PersistenceError::NotFound(self.session_id.clone()))?;
            return Ok(session);
        }

        let missing = record.missing_clauses();
        if !missing.is_empty() {
            warn!(
                "Consent for session {} incomplete: {}",
                self.session_id,
                missing.join(", ")
            );
            return Err(ConsentError::Incomplete(missing).into());
        }

        record.accepted_at = Some(Utc::now());
        let session = self
            .repository
            .save_consent(&self.session_id, &record)
            .await?;

        info!(
            "Consent accepted for session {} (recording consent: {})",
            self.session_id,
            record.recording_consent()
        );

        if let Ok(mut accepted) = self.accepted.write() {
            *accepted = Some(record);
        }

        Ok(session)
    }

    pub fn accepted_record(&self) -> Option<ConsentRecord> {
        self.accepted.read().ok().and_then(|r| r.clone())
    }

    pub fn consent_given(&self) -> bool {
        self.accepted_record()
            .map(|r| r.consent_given())
            .unwrap_or(false)
    }

    pub fn recording_consent(&self) -> bool {
        self.accepted_record()
            .map(|r| r.recording_consent())
            .unwrap_or(false)
    }
}
