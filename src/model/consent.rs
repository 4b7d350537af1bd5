use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Informed consent captured at the start of an attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentRecord {
    pub identity_verification: bool,

    pub document_sharing: bool,

    /// Optional clause; drives `recording_consent` only
    pub video_recording: bool,

    pub data_processing: bool,

    pub terms_accepted: bool,

    /// Set once the record has been accepted
    pub accepted_at: Option<DateTime<Utc>>,
}

impl ConsentRecord {
    /// Every clause accepted
    pub fn all() -> Self {
        Self {
            identity_verification: true,
            document_sharing: true,
            video_recording: true,
            data_processing: true,
            terms_accepted: true,
            accepted_at: None,
        }
    }

    /// Names of required clauses that are still unchecked
    pub fn missing_clauses(&self) -> Vec<&'static str> {
        [
            ("identity_verification", self.identity_verification),
            ("document_sharing", self.document_sharing),
            ("data_processing", self.data_processing),
            ("terms_accepted", self.terms_accepted),
        ]
        .into_iter()
        .filter(|(_, accepted)| !accepted)
        .map(|(name, _)| name)
        .collect()
    }

    /// Same answers to every clause, whenever they were given
    pub fn same_clauses(&self, other: &ConsentRecord) -> bool {
        self.identity_verification == other.identity_verification
            && self.document_sharing == other.document_sharing
            && self.video_recording == other.video_recording
            && self.data_processing == other.data_processing
            && self.terms_accepted == other.terms_accepted
    }

    pub fn consent_given(&self) -> bool {
        self.missing_clauses().is_empty()
    }

    pub fn recording_consent(&self) -> bool {
        self.video_recording
    }
}
