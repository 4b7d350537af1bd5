// Consent capture: validation, persistence and the derived session flags

mod common;

use anyhow::Result;
use common::{consent_without_recording, new_session};
use live_verify::consent::ConsentManager;
use live_verify::error::{ConsentError, SessionError};
use live_verify::model::ConsentRecord;
use live_verify::storage::{InMemoryRepository, Repository};
use std::sync::Arc;

async fn manager() -> Result<(ConsentManager, Arc<dyn Repository>, String)> {
    let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
    let session = new_session("subject-1");
    repository.create_session(&session).await?;
    let manager = ConsentManager::new(&session.session_id, Arc::clone(&repository));
    Ok((manager, repository, session.session_id))
}

#[tokio::test]
async fn test_missing_required_clause_writes_nothing() -> Result<()> {
    let (manager, repository, session_id) = manager().await?;

    let record = ConsentRecord {
        document_sharing: false,
        ..ConsentRecord::all()
    };
    let err = manager.accept(record).await.unwrap_err();

    match err {
        SessionError::Consent(ConsentError::Incomplete(missing)) => {
            assert_eq!(missing, vec!["document_sharing"]);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(repository.get_consent(&session_id).await?.is_none());
    assert!(!manager.consent_given());

    // Re-presenting complete consent recovers
    manager.accept(ConsentRecord::all()).await?;
    assert!(manager.consent_given());

    Ok(())
}

#[tokio::test]
async fn test_four_of_five_without_recording() -> Result<()> {
    let (manager, repository, session_id) = manager().await?;

    let session = manager.accept(consent_without_recording()).await?;

    assert!(session.consent_given);
    assert!(!session.recording_consent);
    assert!(manager.consent_given());
    assert!(!manager.recording_consent());

    let stored = repository.get_consent(&session_id).await?.unwrap();
    assert!(stored.accepted_at.is_some());
    assert!(!stored.video_recording);

    Ok(())
}

#[tokio::test]
async fn test_changed_answers_after_acceptance_are_rejected() -> Result<()> {
    let (manager, _repository, _) = manager().await?;

    manager.accept(ConsentRecord::all()).await?;
    let err = manager.accept(consent_without_recording()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Consent(ConsentError::AlreadyAccepted)
    ));
    assert!(manager.recording_consent());

    Ok(())
}

#[tokio::test]
async fn test_replaying_the_accepted_record_is_idempotent() -> Result<()> {
    let (manager, repository, session_id) = manager().await?;

    let first = manager.accept(ConsentRecord::all()).await?;
    let stored_at = repository.get_consent(&session_id).await?.unwrap().accepted_at;

    let replay = manager.accept(ConsentRecord::all()).await?;
    assert_eq!(replay.session_id, first.session_id);
    assert!(replay.consent_given);
    assert!(replay.recording_consent);

    // The original acceptance time is kept
    let stored = repository.get_consent(&session_id).await?.unwrap();
    assert_eq!(stored.accepted_at, stored_at);

    Ok(())
}

#[tokio::test]
async fn test_restore_after_restart() -> Result<()> {
    let (manager, repository, session_id) = manager().await?;
    manager.accept(ConsentRecord::all()).await?;

    let restarted = ConsentManager::new(&session_id, Arc::clone(&repository));
    assert!(!restarted.consent_given());

    let record = repository.get_consent(&session_id).await?.unwrap();
    restarted.restore(record);
    assert!(restarted.consent_given());
    assert!(restarted.recording_consent());

    Ok(())
}
