use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, UploadError};
use crate::model::{
    DocumentSet, DocumentType, SessionDocument, VerificationStatus, MAX_DOCUMENT_BYTES,
};
use crate::storage::{BlobStore, Repository};

/// A file handed over by the calling shell
#[derive(Debug, Clone)]
pub struct DocumentFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Check a file against the rule of its document type. Never touches the network.
pub fn validate_document(
    file: &DocumentFile,
    document_type: DocumentType,
    max_upload_bytes: u64,
) -> Result<(), UploadError> {
    let rule = document_type.rule();

    if !rule.accepts(&file.mime_type) {
        return Err(UploadError::UnsupportedFormat {
            document_type,
            mime_type: file.mime_type.clone(),
        });
    }

    let limit = rule.max_bytes.min(max_upload_bytes);
    let size = file.bytes.len() as u64;
    if size > limit {
        return Err(UploadError::FileTooLarge { size, limit });
    }
    if size == 0 {
        return Err(UploadError::EmptyFile);
    }

    Ok(())
}

/// Reports strictly increasing percentages
struct Progress<'a> {
    tx: Option<&'a mpsc::UnboundedSender<u8>>,
    last: Option<u8>,
}

impl<'a> Progress<'a> {
    fn new(tx: Option<&'a mpsc::UnboundedSender<u8>>) -> Self {
        Self { tx, last: None }
    }

    fn report(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.last.map_or(false, |last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(tx) = self.tx {
            let _ = tx.send(percent);
        }
    }
}

type SlotKey = (String, DocumentType);

pub struct DocumentIntake {
    repository: Arc<dyn Repository>,
    blobs: Arc<dyn BlobStore>,
    max_upload_bytes: u64,
    /// Serializes uploads of one (session, type); other types proceed in parallel
    slots: DashMap<SlotKey, Arc<Mutex<()>>>,
    /// Confirmed current documents per session
    read_model: DashMap<String, DocumentSet>,
}

impl DocumentIntake {
    pub fn new(repository: Arc<dyn Repository>, blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_limit(repository, blobs, MAX_DOCUMENT_BYTES)
    }

    pub fn with_limit(
        repository: Arc<dyn Repository>,
        blobs: Arc<dyn BlobStore>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            repository,
            blobs,
            max_upload_bytes,
            slots: DashMap::new(),
            read_model: DashMap::new(),
        }
    }

    fn slot(&self, session_id: &str, document_type: DocumentType) -> Arc<Mutex<()>> {
        Arc::clone(
            &self
                .slots
                .entry((session_id.to_string(), document_type))
                .or_default(),
        )
    }

    /// Validate, store and make `file` the current document of its type
    ///
    /// Progress goes 0 (accepted), 10 (validated), 90 (blob stored), 100
    /// (repository confirmed).
    /// On failure the previous current document stays in place.
    pub async fn upload(
        &self,
        session_id: &str,
        file: DocumentFile,
        document_type: DocumentType,
        progress: Option<&mpsc::UnboundedSender<u8>>,
    ) -> Result<SessionDocument, UploadError> {
        let mut progress = Progress::new(progress);
        progress.report(0);

        if let Err(e) = validate_document(&file, document_type, self.max_upload_bytes) {
            warn!(
                "Rejected {} upload {:?} for session {}: {}",
                document_type, file.name, session_id, e
            );
            return Err(e);
        }
        progress.report(10);

        let slot = self.slot(session_id, document_type);
        let _serialized = slot.lock().await;

        let document_id = uuid::Uuid::new_v4().to_string();
        let blob_path = format!("documents/{}/{}/{}", session_id, document_type, document_id);

        info!(
            "Uploading {} {:?} ({} bytes) for session {}",
            document_type,
            file.name,
            file.bytes.len(),
            session_id
        );

        let storage_ref = self
            .blobs
            .put(&blob_path, &file.bytes)
            .await
            .map_err(|e| UploadError::UploadFailed(e.to_string()))?;
        progress.report(90);

        let document = SessionDocument {
            id: document_id,
            session_id: session_id.to_string(),
            document_type,
            name: file.name,
            mime_type: file.mime_type.trim().to_ascii_lowercase(),
            size_bytes: file.bytes.len() as u64,
            blob_path,
            storage_ref,
            verification_status: VerificationStatus::Pending,
            uploaded_at: Utc::now(),
        };

        let superseded = match self.repository.replace_document(&document).await {
            Ok(superseded) => superseded,
            Err(e) => {
                warn!(
                    "Repository rejected {} for session {}: {}",
                    document_type, session_id, e
                );
                if let Err(cleanup) = self.blobs.delete(&document.blob_path).await {
                    debug!("Orphaned blob left behind: {}", cleanup);
                }
                return Err(e.into());
            }
        };

        if let Err(e) = self.refresh(session_id).await {
            // The write is confirmed; the next guard check refreshes again
            warn!("Document read model refresh failed for {}: {}", session_id, e);
            self.invalidate(session_id);
        }
        progress.report(100);

        if let Some(previous) = superseded {
            info!(
                "{} {} superseded by {} for session {}",
                document_type, previous.id, document.id, session_id
            );
            if let Err(e) = self.blobs.delete(&previous.blob_path).await {
                warn!("Failed to delete superseded blob {}: {}", previous.blob_path, e);
            }
        }

        Ok(document)
    }

    /// Reload the current documents of a session from the repository
    pub async fn refresh(&self, session_id: &str) -> Result<DocumentSet, PersistenceError> {
        let documents = self.repository.list_documents(session_id).await?;
        let set = DocumentSet::from_documents(documents);

        self.read_model.insert(session_id.to_string(), set.clone());

        Ok(set)
    }

    fn invalidate(&self, session_id: &str) {
        self.read_model.remove(session_id);
    }

    /// Drop the per-session state of an attempt that has ended
    pub fn forget(&self, session_id: &str) {
        self.invalidate(session_id);
        self.slots.retain(|(session, _), _| session != session_id);
        debug!("Released document state for session {}", session_id);
    }

    /// True while any cached state is held for `session_id`
    pub fn is_tracking(&self, session_id: &str) -> bool {
        self.read_model.contains_key(session_id)
            || self.slots.iter().any(|entry| entry.key().0 == session_id)
    }

    /// Current documents as last confirmed by the repository
    pub fn current_documents(&self, session_id: &str) -> DocumentSet {
        self.read_model
            .get(session_id)
            .map(|set| set.value().clone())
            .unwrap_or_default()
    }

    /// True iff every required type has a current document
    pub fn required_documents_satisfied(&self, session_id: &str) -> bool {
        self.current_documents(session_id)
            .required_documents_satisfied()
    }
}
