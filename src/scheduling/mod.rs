//! Deferred sessions: slot proposal and commitment

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PersistenceError, SchedulingError, SlotRejection};
use crate::model::{VerificationSession, VerificationTier};
use crate::storage::Repository;

/// Default booking horizon in days
pub const DEFAULT_HORIZON_DAYS: i64 = 30;

/// External process that books agent time
#[async_trait]
pub trait SchedulingCollaborator: Send + Sync {
    /// Commit a scheduled session, or fail `SlotUnavailable`
    async fn schedule(
        &self,
        subject_id: &str,
        scheduled_at: DateTime<Utc>,
        tier: VerificationTier,
    ) -> Result<VerificationSession, SchedulingError>;
}

/// Local slot checks, applied before the collaborator is contacted
pub fn check_slot(
    now: DateTime<Utc>,
    date: NaiveDate,
    time: NaiveTime,
    horizon_days: i64,
) -> Result<DateTime<Utc>, SchedulingError> {
    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return Err(SchedulingError::SlotUnavailable(SlotRejection::Weekend));
    }

    let today = now.date_naive();
    if date < today || (date == today && time <= now.time()) {
        return Err(SchedulingError::SlotUnavailable(SlotRejection::InPast));
    }

    if (date - today).num_days() > horizon_days {
        return Err(SchedulingError::SlotUnavailable(SlotRejection::BeyondHorizon));
    }

    Ok(date.and_time(time).and_utc())
}

pub struct SchedulingFrontend {
    collaborator: Arc<dyn SchedulingCollaborator>,
    horizon_days: i64,
}

impl SchedulingFrontend {
    pub fn new(collaborator: Arc<dyn SchedulingCollaborator>, horizon_days: i64) -> Self {
        Self {
            collaborator,
            horizon_days,
        }
    }

    /// Propose a UTC slot for `subject_id`
    pub async fn propose_slot(
        &self,
        subject_id: &str,
        tier: VerificationTier,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<VerificationSession, SchedulingError> {
        self.propose_slot_at(Utc::now(), subject_id, tier, date, time)
            .await
    }

    pub async fn propose_slot_at(
        &self,
        now: DateTime<Utc>,
        subject_id: &str,
        tier: VerificationTier,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<VerificationSession, SchedulingError> {
        let scheduled_at = match check_slot(now, date, time, self.horizon_days) {
            Ok(at) => at,
            Err(e) => {
                warn!("Slot {} {} rejected for {}: {}", date, time, subject_id, e);
                return Err(e);
            }
        };

        let session = self
            .collaborator
            .schedule(subject_id, scheduled_at, tier)
            .await?;

        info!(
            "Scheduled session {} for {} at {}",
            session.session_id, subject_id, scheduled_at
        );

        Ok(session)
    }
}

/// Scheduling collaborator that commits straight to the repository
pub struct RepositoryScheduler {
    repository: Arc<dyn Repository>,
}

impl RepositoryScheduler {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl SchedulingCollaborator for RepositoryScheduler {
    async fn schedule(
        &self,
        subject_id: &str,
        scheduled_at: DateTime<Utc>,
        tier: VerificationTier,
    ) -> Result<VerificationSession, SchedulingError> {
        let session = VerificationSession::scheduled(subject_id, tier, scheduled_at);

        match self.repository.create_session(&session).await {
            Ok(()) => Ok(session),
            Err(PersistenceError::Conflict(reason)) => {
                warn!("Scheduling refused for {}: {}", subject_id, reason);
                Err(SchedulingError::SlotUnavailable(SlotRejection::Taken))
            }
            Err(e) => Err(SchedulingError::Collaborator(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // Wednesday 2026-10-14 12:00 UTC
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    fn at(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekend_rejected() {
        let err = check_slot(now(), day(2026, 10, 17), at(10), 30).unwrap_err();
        assert_eq!(err, SchedulingError::SlotUnavailable(SlotRejection::Weekend));
        let err = check_slot(now(), day(2026, 10, 18), at(10), 30).unwrap_err();
        assert_eq!(err, SchedulingError::SlotUnavailable(SlotRejection::Weekend));
    }

    #[test]
    fn test_past_rejected() {
        let err = check_slot(now(), day(2026, 10, 13), at(15), 30).unwrap_err();
        assert_eq!(err, SchedulingError::SlotUnavailable(SlotRejection::InPast));
        // Earlier today
        let err = check_slot(now(), day(2026, 10, 14), at(9), 30).unwrap_err();
        assert_eq!(err, SchedulingError::SlotUnavailable(SlotRejection::InPast));
    }

    #[test]
    fn test_horizon() {
        // Exactly 30 days out is a Friday and still bookable
        assert!(check_slot(now(), day(2026, 11, 13), at(10), 30).is_ok());
        let err = check_slot(now(), day(2026, 11, 16), at(10), 30).unwrap_err();
        assert_eq!(err, SchedulingError::SlotUnavailable(SlotRejection::BeyondHorizon));
    }

    #[test]
    fn test_accepted_slot_is_utc() {
        let slot = check_slot(now(), day(2026, 10, 15), at(9), 30).unwrap();
        assert_eq!(slot, Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap());
    }
}
