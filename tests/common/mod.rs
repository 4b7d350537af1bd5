// Shared fakes for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use live_verify::controller::SessionContext;
use live_verify::documents::{DocumentFile, DocumentIntake};
use live_verify::error::{DeviceError, PersistenceError, SignalingError, StorageError};
use live_verify::media::{
    spawn_auto_answer, CaptureBackend, CaptureConstraints, CaptureStream, ChannelSignaling,
    FrameOrigin, IceCandidate, MediaConfig, MediaFrame, MediaKind, PeerConnection, RelayPeer,
    SignalingChannel, TrackInfo,
};
use live_verify::model::{
    ConsentRecord, SessionDocument, SessionStatus, VerificationSession, VerificationTier,
};
use live_verify::recording::RecordingConfig;
use live_verify::storage::{BlobRef, BlobStore, InMemoryRepository, MemoryBlobStore, Repository};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn frame(kind: MediaKind, timestamp_ms: u64) -> MediaFrame {
    MediaFrame {
        kind,
        origin: FrameOrigin::Local,
        timestamp_ms,
        payload: vec![0xAB; 16],
    }
}

/// Test-side handle feeding frames into an acquired scripted capture
#[derive(Clone, Default)]
pub struct Feeder {
    tx: Arc<StdMutex<Option<mpsc::Sender<MediaFrame>>>>,
}

impl Feeder {
    /// False when nothing is capturing
    pub fn push(&self, frame: MediaFrame) -> bool {
        let tx = self.tx.lock().unwrap();
        match tx.as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }
}

/// Capture backend that hands out a fixed set of tracks
pub struct ScriptedCapture {
    kinds: Vec<MediaKind>,
    failure: Option<DeviceError>,
    feeder: Feeder,
    pub releases: Arc<AtomicUsize>,
}

impl ScriptedCapture {
    pub fn audio_video() -> Self {
        Self::with_kinds(vec![MediaKind::Audio, MediaKind::Video])
    }

    pub fn with_kinds(kinds: Vec<MediaKind>) -> Self {
        Self {
            kinds,
            failure: None,
            feeder: Feeder::default(),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: DeviceError) -> Self {
        Self {
            failure: Some(error),
            ..Self::audio_video()
        }
    }

    pub fn feeder(&self) -> Feeder {
        self.feeder.clone()
    }
}

#[async_trait]
impl CaptureBackend for ScriptedCapture {
    async fn acquire(&mut self, _constraints: &CaptureConstraints) -> Result<CaptureStream, DeviceError> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }

        let (tx, rx) = mpsc::channel(256);
        *self.feeder.tx.lock().unwrap() = Some(tx);

        let tracks = self
            .kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| TrackInfo {
                id: format!("scripted-{}", i),
                kind: *kind,
            })
            .collect();

        Ok(CaptureStream { tracks, frames: rx })
    }

    async fn release(&mut self) {
        *self.feeder.tx.lock().unwrap() = None;
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn is_capturing(&self) -> bool {
        self.feeder.tx.lock().unwrap().is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Relay peer that also delivers remote frames once connected
pub struct RemoteFramesPeer {
    inner: RelayPeer,
    remote: Option<mpsc::Receiver<MediaFrame>>,
}

impl RemoteFramesPeer {
    pub fn new() -> (Self, mpsc::Sender<MediaFrame>) {
        let (tx, rx) = mpsc::channel(256);
        (
            Self {
                inner: RelayPeer::new(),
                remote: Some(rx),
            },
            tx,
        )
    }
}

#[async_trait]
impl PeerConnection for RemoteFramesPeer {
    async fn create_offer(&mut self, tracks: &[MediaKind]) -> Result<String, SignalingError> {
        self.inner.create_offer(tracks).await
    }

    async fn apply_answer(&mut self, sdp: &str) -> Result<(), SignalingError> {
        self.inner.apply_answer(sdp).await
    }

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), SignalingError> {
        self.inner.add_ice_candidate(candidate).await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn take_remote_frames(&mut self) -> Option<mpsc::Receiver<MediaFrame>> {
        if self.inner.is_connected() {
            self.remote.take()
        } else {
            None
        }
    }

    async fn close(&mut self) {
        self.inner.close().await;
    }
}

/// Blob store whose writes can be switched off
#[derive(Default)]
pub struct FlakyBlobStore {
    pub inner: MemoryBlobStore,
    pub fail_puts: AtomicBool,
    pub puts: AtomicUsize,
}

impl FlakyBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_puts.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<BlobRef, StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed {
                path: path.to_string(),
                reason: "network unreachable".to_string(),
            });
        }
        self.inner.put(path, bytes).await
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.inner.delete(path).await
    }
}

/// Repository wrapper that can refuse status updates or document writes
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: InMemoryRepository,
    pub conflict_on_status: AtomicBool,
    pub unavailable_documents: AtomicBool,
    /// Status writes still to fail with `Unavailable`
    pub unavailable_status: AtomicUsize,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_status_writes(&self, count: usize) {
        self.unavailable_status.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn create_session(&self, session: &VerificationSession) -> Result<(), PersistenceError> {
        self.inner.create_session(session).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<VerificationSession>, PersistenceError> {
        self.inner.get_session(session_id).await
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<VerificationSession, PersistenceError> {
        if self.conflict_on_status.load(Ordering::SeqCst) && status != SessionStatus::Cancelled {
            return Err(PersistenceError::Conflict(format!(
                "session {} was modified elsewhere",
                session_id
            )));
        }
        let blip = self
            .unavailable_status
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if blip {
            return Err(PersistenceError::Unavailable("blip".to_string()));
        }
        self.inner.update_status(session_id, status).await
    }

    async fn save_consent(
        &self,
        session_id: &str,
        consent: &ConsentRecord,
    ) -> Result<VerificationSession, PersistenceError> {
        self.inner.save_consent(session_id, consent).await
    }

    async fn get_consent(&self, session_id: &str) -> Result<Option<ConsentRecord>, PersistenceError> {
        self.inner.get_consent(session_id).await
    }

    async fn list_documents(&self, session_id: &str) -> Result<Vec<SessionDocument>, PersistenceError> {
        self.inner.list_documents(session_id).await
    }

    async fn replace_document(
        &self,
        document: &SessionDocument,
    ) -> Result<Option<SessionDocument>, PersistenceError> {
        if self.unavailable_documents.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("connection reset".to_string()));
        }
        self.inner.replace_document(document).await
    }
}

pub fn jpeg(name: &str, len: usize) -> DocumentFile {
    DocumentFile {
        name: name.to_string(),
        mime_type: "image/jpeg".to_string(),
        bytes: vec![0xFF; len],
    }
}

pub fn png(name: &str, len: usize) -> DocumentFile {
    DocumentFile {
        name: name.to_string(),
        mime_type: "image/png".to_string(),
        bytes: vec![0x89; len],
    }
}

pub fn pdf(name: &str, len: usize) -> DocumentFile {
    DocumentFile {
        name: name.to_string(),
        mime_type: "application/pdf".to_string(),
        bytes: vec![0x25; len],
    }
}

/// Consent with every clause except video recording
pub fn consent_without_recording() -> ConsentRecord {
    ConsentRecord {
        video_recording: false,
        ..ConsentRecord::all()
    }
}

pub fn fast_media() -> MediaConfig {
    MediaConfig {
        signaling_timeout: Duration::from_millis(200),
        ..MediaConfig::default()
    }
}

/// Shared services for one test
pub struct Harness {
    pub repository: Arc<dyn Repository>,
    pub blobs: Arc<MemoryBlobStore>,
    pub documents: Arc<DocumentIntake>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_repository(Arc::new(InMemoryRepository::new()))
    }

    pub fn with_repository(repository: Arc<dyn Repository>) -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        let documents = Arc::new(DocumentIntake::new(
            Arc::clone(&repository),
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
        ));
        Self {
            repository,
            blobs,
            documents,
        }
    }

    /// Context whose agent answers every offer
    pub fn context(&self, session: VerificationSession) -> SessionContext {
        let (subject, agent) = ChannelSignaling::pair();
        spawn_auto_answer(agent);
        self.context_with(session, Box::new(ScriptedCapture::audio_video()), Box::new(subject))
    }

    pub fn context_with(
        &self,
        session: VerificationSession,
        capture: Box<dyn CaptureBackend>,
        signaling: Box<dyn SignalingChannel>,
    ) -> SessionContext {
        SessionContext {
            session,
            repository: Arc::clone(&self.repository),
            blobs: Arc::clone(&self.blobs) as Arc<dyn BlobStore>,
            documents: Arc::clone(&self.documents),
            media: fast_media(),
            recording: RecordingConfig::default(),
            capture,
            peer: Box::new(RelayPeer::new()),
            signaling,
        }
    }
}

pub fn new_session(subject: &str) -> VerificationSession {
    VerificationSession::new(subject, VerificationTier::LIVE_VERIFIED)
}
