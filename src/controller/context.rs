use std::sync::Arc;

use crate::documents::DocumentIntake;
use crate::media::{CaptureBackend, MediaConfig, PeerConnection, SignalingChannel};
use crate::model::VerificationSession;
use crate::recording::RecordingConfig;
use crate::storage::{BlobStore, Repository};

/// Everything one attempt needs, handed to the controller explicitly
///
/// Shared services (`repository`, `blobs`, `documents`) are reference counted
/// and outlive the attempt; the media handles are owned by it and released on
/// every exit edge.
pub struct SessionContext {
    pub session: VerificationSession,
    pub repository: Arc<dyn Repository>,
    pub blobs: Arc<dyn BlobStore>,
    pub documents: Arc<DocumentIntake>,
    pub media: MediaConfig,
    pub recording: RecordingConfig,
    pub capture: Box<dyn CaptureBackend>,
    pub peer: Box<dyn PeerConnection>,
    pub signaling: Box<dyn SignalingChannel>,
}
