//! Submission for out-of-band human review

use std::sync::Arc;
use tracing::{info, warn};

use crate::documents::DocumentIntake;
use crate::error::SessionError;
use crate::model::{SessionStatus, VerificationSession};
use crate::storage::Repository;

/// Moves a session to `pending_review` once its required documents are present
pub struct ReviewAggregator {
    repository: Arc<dyn Repository>,
    documents: Arc<DocumentIntake>,
}

impl ReviewAggregator {
    pub fn new(repository: Arc<dyn Repository>, documents: Arc<DocumentIntake>) -> Self {
        Self {
            repository,
            documents,
        }
    }

    /// Refreshes the document read model so the guard sees confirmed state only
    pub async fn ready_for_review(&self, session_id: &str) -> Result<bool, SessionError> {
        let set = self.documents.refresh(session_id).await?;
        Ok(set.required_documents_satisfied())
    }

    /// Submit the session; the status change is the completion signal for reviewers
    pub async fn submit(&self, session_id: &str) -> Result<VerificationSession, SessionError> {
        let set = self.documents.refresh(session_id).await?;
        let missing = set.missing_required();
        if !missing.is_empty() {
            warn!(
                "Submission of {} refused, missing documents: {:?}",
                session_id, missing
            );
            return Err(SessionError::RequiredDocumentsMissing(missing));
        }

        let session = self
            .repository
            .update_status(session_id, SessionStatus::PendingReview)
            .await?;

        info!(
            "Session {} submitted for review with {} documents",
            session_id,
            set.len()
        );

        Ok(session)
    }
}
