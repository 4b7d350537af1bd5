use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordinal trust level granted when a verification completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationTier(pub u8);

impl VerificationTier {
    /// The tier earned through a live, agent-witnessed session
    pub const LIVE_VERIFIED: VerificationTier = VerificationTier(3);
}

impl Default for VerificationTier {
    fn default() -> Self {
        Self::LIVE_VERIFIED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    PendingReview,
    Approved,
    Rejected,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Approved | SessionStatus::Rejected | SessionStatus::Cancelled
        )
    }

    fn rank(&self) -> u8 {
        match self {
            SessionStatus::Scheduled => 0,
            SessionStatus::InProgress => 1,
            SessionStatus::PendingReview => 2,
            SessionStatus::Approved | SessionStatus::Rejected => 3,
            SessionStatus::Cancelled => 4,
        }
    }

    /// Status only moves forward, except for explicit cancel and reject.
    /// Re-applying the current status is allowed so writes stay idempotent.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;

        if *self == next {
            return true;
        }

        match (self, next) {
            (Approved | Rejected | Cancelled, _) => false,
            (_, Cancelled) => true,
            (PendingReview, Rejected | Approved) => true,
            (_, Rejected | Approved) => false,
            (from, to) => to.rank() > from.rank(),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::PendingReview => "pending_review",
            SessionStatus::Approved => "approved",
            SessionStatus::Rejected => "rejected",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One verification attempt for a subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSession {
    pub session_id: String,

    /// Reference to the subject being verified
    pub subject_id: String,

    pub tier: VerificationTier,

    pub status: SessionStatus,

    /// All required consent clauses accepted
    pub consent_given: bool,

    /// Video recording clause accepted
    pub recording_consent: bool,

    /// Set for sessions booked ahead of time
    pub scheduled_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl VerificationSession {
    /// A session that starts immediately
    pub fn new(subject_id: impl Into<String>, tier: VerificationTier) -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            tier,
            status: SessionStatus::InProgress,
            consent_given: false,
            recording_consent: false,
            scheduled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A session booked for a future slot
    pub fn scheduled(
        subject_id: impl Into<String>,
        tier: VerificationTier,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: SessionStatus::Scheduled,
            scheduled_at: Some(scheduled_at),
            ..Self::new(subject_id, tier)
        }
    }
}
