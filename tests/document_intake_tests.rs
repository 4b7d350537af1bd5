// Document intake: local validation, supersession, progress and failure handling

mod common;

use anyhow::Result;
use common::{jpeg, new_session, pdf, png, FlakyBlobStore, FlakyRepository};
use live_verify::documents::DocumentIntake;
use live_verify::error::{PersistenceError, SessionError, UploadError};
use live_verify::model::{DocumentType, SessionStatus, VerificationStatus};
use live_verify::review::ReviewAggregator;
use live_verify::storage::{BlobStore, InMemoryRepository, Repository};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

const MB: usize = 1024 * 1024;

struct Setup {
    repository: Arc<FlakyRepository>,
    blobs: Arc<FlakyBlobStore>,
    intake: Arc<DocumentIntake>,
    session_id: String,
}

async fn setup() -> Result<Setup> {
    let repository = Arc::new(FlakyRepository::new());
    let blobs = Arc::new(FlakyBlobStore::new());
    let session = new_session("subject-docs");
    repository.create_session(&session).await?;

    let intake = Arc::new(DocumentIntake::new(
        Arc::clone(&repository) as Arc<dyn Repository>,
        Arc::clone(&blobs) as Arc<dyn BlobStore>,
    ));

    Ok(Setup {
        repository,
        blobs,
        intake,
        session_id: session.session_id,
    })
}

fn drain(rx: &mut mpsc::UnboundedReceiver<u8>) -> Vec<u8> {
    let mut seen = Vec::new();
    while let Ok(p) = rx.try_recv() {
        seen.push(p);
    }
    seen
}

#[tokio::test]
async fn test_required_documents_then_submit() -> Result<()> {
    let s = setup().await?;

    s.intake
        .upload(&s.session_id, jpeg("id.jpg", 2 * MB), DocumentType::GovernmentId, None)
        .await?;
    assert!(!s.intake.required_documents_satisfied(&s.session_id));

    s.intake
        .upload(&s.session_id, png("me.png", MB), DocumentType::Selfie, None)
        .await?;
    assert!(s.intake.required_documents_satisfied(&s.session_id));

    let review = ReviewAggregator::new(
        Arc::clone(&s.repository) as Arc<dyn Repository>,
        Arc::clone(&s.intake),
    );
    assert!(review.ready_for_review(&s.session_id).await?);

    let session = review.submit(&s.session_id).await?;
    assert_eq!(session.status, SessionStatus::PendingReview);

    Ok(())
}

#[tokio::test]
async fn test_oversized_file_rejected_before_any_write() -> Result<()> {
    let s = setup().await?;

    let err = s
        .intake
        .upload(&s.session_id, pdf("deed.pdf", 15 * MB), DocumentType::GovernmentId, None)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::FileTooLarge { .. }));
    assert!(!err.is_retryable());
    assert_eq!(s.blobs.puts.load(Ordering::SeqCst), 0);
    assert!(s.repository.list_documents(&s.session_id).await?.is_empty());
    assert!(s.intake.current_documents(&s.session_id).is_empty());

    Ok(())
}

#[tokio::test]
async fn test_wrong_format_and_empty_file_rejected_locally() -> Result<()> {
    let s = setup().await?;

    let err = s
        .intake
        .upload(&s.session_id, pdf("selfie.pdf", 10), DocumentType::Selfie, None)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::UnsupportedFormat { document_type: DocumentType::Selfie, .. }));

    let err = s
        .intake
        .upload(&s.session_id, png("blank.png", 0), DocumentType::Selfie, None)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::EmptyFile));

    assert_eq!(s.blobs.puts.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_repeated_uploads_keep_only_the_last() -> Result<()> {
    let s = setup().await?;

    let mut last = None;
    for i in 0..4 {
        let file = png(&format!("selfie-{}.png", i), 100 + i);
        last = Some(
            s.intake
                .upload(&s.session_id, file, DocumentType::Selfie, None)
                .await?,
        );
    }
    let last = last.unwrap();

    let stored = s.repository.list_documents(&s.session_id).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, last.id);
    assert_eq!(stored[0].name, "selfie-3.png");
    assert_eq!(stored[0].size_bytes, 103);
    assert_eq!(stored[0].verification_status, VerificationStatus::Pending);

    let current = s.intake.current_documents(&s.session_id);
    assert_eq!(current.len(), 1);
    assert_eq!(current.get(DocumentType::Selfie).map(|d| d.id.clone()), Some(last.id.clone()));

    // Superseded blobs are cleaned up
    let paths = s.blobs.inner.paths().await;
    assert_eq!(paths, vec![last.blob_path.clone()]);
    assert_eq!(s.blobs.inner.get(&last.blob_path).await.map(|b| b.len()), Some(103));

    Ok(())
}

#[tokio::test]
async fn test_progress_milestones() -> Result<()> {
    let s = setup().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    s.intake
        .upload(&s.session_id, jpeg("id.jpg", 64), DocumentType::GovernmentId, Some(&tx))
        .await?;
    assert_eq!(drain(&mut rx), vec![0, 10, 90, 100]);

    s.blobs.set_failing(true);
    let _ = s
        .intake
        .upload(&s.session_id, jpeg("id.jpg", 64), DocumentType::GovernmentId, Some(&tx))
        .await;
    let seen = drain(&mut rx);
    assert!(!seen.contains(&100), "failed upload reported completion: {:?}", seen);

    Ok(())
}

#[tokio::test]
async fn test_network_failure_keeps_previous_document() -> Result<()> {
    let s = setup().await?;

    let first = s
        .intake
        .upload(&s.session_id, jpeg("id-v1.jpg", 32), DocumentType::GovernmentId, None)
        .await?;

    s.blobs.set_failing(true);
    let err = s
        .intake
        .upload(&s.session_id, jpeg("id-v2.jpg", 32), DocumentType::GovernmentId, None)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::UploadFailed(_)));
    assert!(err.is_retryable());

    let current = s.intake.current_documents(&s.session_id);
    assert_eq!(current.get(DocumentType::GovernmentId).map(|d| d.id.clone()), Some(first.id.clone()));
    assert!(s.blobs.inner.get(&first.blob_path).await.is_some());

    // Retry after the network comes back
    s.blobs.set_failing(false);
    let second = s
        .intake
        .upload(&s.session_id, jpeg("id-v2.jpg", 32), DocumentType::GovernmentId, None)
        .await?;
    let current = s.intake.current_documents(&s.session_id);
    assert_eq!(current.get(DocumentType::GovernmentId).map(|d| d.id.clone()), Some(second.id));

    Ok(())
}

#[tokio::test]
async fn test_repository_failure_removes_new_blob() -> Result<()> {
    let s = setup().await?;

    let first = s
        .intake
        .upload(&s.session_id, png("me.png", 32), DocumentType::Selfie, None)
        .await?;

    s.repository.unavailable_documents.store(true, Ordering::SeqCst);
    let err = s
        .intake
        .upload(&s.session_id, png("me-again.png", 32), DocumentType::Selfie, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UploadError::Persistence(PersistenceError::Unavailable(_))
    ));
    assert!(err.is_retryable());
    assert_eq!(s.blobs.inner.paths().await, vec![first.blob_path.clone()]);

    let stored = s.repository.list_documents(&s.session_id).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, first.id);

    Ok(())
}

#[tokio::test]
async fn test_different_types_upload_concurrently() -> Result<()> {
    let s = setup().await?;

    let (id, selfie, deed) = tokio::join!(
        s.intake.upload(&s.session_id, jpeg("id.jpg", 10), DocumentType::GovernmentId, None),
        s.intake.upload(&s.session_id, png("me.png", 10), DocumentType::Selfie, None),
        s.intake.upload(&s.session_id, pdf("deed.pdf", 10), DocumentType::PropertyDocument, None),
    );
    id?;
    selfie?;
    deed?;

    let current = s.intake.refresh(&s.session_id).await?;
    assert_eq!(current.len(), 3);
    assert!(current.required_documents_satisfied());

    Ok(())
}

#[tokio::test]
async fn test_same_type_uploads_leave_one_current() -> Result<()> {
    let s = setup().await?;

    let (a, b) = tokio::join!(
        s.intake.upload(&s.session_id, jpeg("a.jpg", 10), DocumentType::GovernmentId, None),
        s.intake.upload(&s.session_id, jpeg("b.jpg", 20), DocumentType::GovernmentId, None),
    );
    let (a, b) = (a?, b?);

    let stored = s.repository.list_documents(&s.session_id).await?;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].id == a.id || stored[0].id == b.id);
    assert_eq!(s.blobs.inner.paths().await, vec![stored[0].blob_path.clone()]);

    Ok(())
}

#[tokio::test]
async fn test_submit_without_selfie_lists_missing() -> Result<()> {
    let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
    let blobs = Arc::new(FlakyBlobStore::new());
    let session = new_session("subject-partial");
    repository.create_session(&session).await?;

    let intake = Arc::new(DocumentIntake::new(
        Arc::clone(&repository),
        blobs as Arc<dyn BlobStore>,
    ));
    intake
        .upload(&session.session_id, pdf("id.pdf", 10), DocumentType::GovernmentId, None)
        .await?;
    intake
        .upload(&session.session_id, pdf("license.pdf", 10), DocumentType::AgencyLicense, None)
        .await?;

    let review = ReviewAggregator::new(Arc::clone(&repository), Arc::clone(&intake));
    assert!(!review.ready_for_review(&session.session_id).await?);

    match review.submit(&session.session_id).await {
        Err(SessionError::RequiredDocumentsMissing(missing)) => {
            assert_eq!(missing, vec![DocumentType::Selfie]);
        }
        other => panic!("unexpected result {:?}", other),
    }

    let stored = repository.get_session(&session.session_id).await?.unwrap();
    assert_eq!(stored.status, SessionStatus::InProgress);

    Ok(())
}

#[tokio::test]
async fn test_forget_drops_session_state_only() -> Result<()> {
    let s = setup().await?;
    let other = new_session("subject-other");
    s.repository.create_session(&other).await?;

    s.intake
        .upload(&s.session_id, jpeg("id.jpg", 1024), DocumentType::GovernmentId, None)
        .await?;
    s.intake
        .upload(&other.session_id, png("me.png", 1024), DocumentType::Selfie, None)
        .await?;
    assert!(s.intake.is_tracking(&s.session_id));

    s.intake.forget(&s.session_id);
    assert!(!s.intake.is_tracking(&s.session_id));
    assert!(s.intake.current_documents(&s.session_id).is_empty());
    assert!(s.intake.is_tracking(&other.session_id));

    // Documents stay persisted and come back on refresh
    let set = s.intake.refresh(&s.session_id).await?;
    assert_eq!(set.len(), 1);
    assert!(set.get(DocumentType::GovernmentId).is_some());

    Ok(())
}
