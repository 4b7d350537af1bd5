use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::segment::{SegmentConfig, SegmentMetadata, SegmentedSink, SinkReport};
use crate::consent::ConsentManager;
use crate::error::RecordingError;
use crate::media::MediaSessionManager;
use crate::storage::BlobStore;

#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Duration of each stored segment
    pub segment_duration: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            segment_duration: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Snapshot of the recording sub-state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingState {
    pub active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub segments_written: usize,
    /// The sink stopped on a storage failure; stop to collect what was kept
    pub sink_failed: bool,
}

/// What a finished recording produced
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSummary {
    pub session_id: String,
    pub recording_id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub segments: Vec<SegmentMetadata>,
    /// Set when storage failed; `segments` then holds only what was stored
    pub failure: Option<String>,
}

impl RecordingSummary {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

struct ActiveRecording {
    recording_id: String,
    started_at: DateTime<Utc>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<SinkReport>,
    failed: Arc<AtomicBool>,
}

impl ActiveRecording {
    fn is_running(&self) -> bool {
        !self.task.is_finished() && !self.failed.load(Ordering::SeqCst)
    }
}

/// Starts and stops the recording of one attempt
///
/// `start` and `stop` hold the same lock for their whole duration, so a stop
/// issued while a start is still settling applies after it.
pub struct RecordingManager {
    session_id: String,
    config: RecordingConfig,
    consent: Arc<ConsentManager>,
    media: Arc<MediaSessionManager>,
    blobs: Arc<dyn BlobStore>,
    slot: Mutex<Option<ActiveRecording>>,
    segments_written: Arc<AtomicUsize>,
}

impl RecordingManager {
    pub fn new(
        config: RecordingConfig,
        consent: Arc<ConsentManager>,
        media: Arc<MediaSessionManager>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            session_id: media.session_id().to_string(),
            config,
            consent,
            media,
            blobs,
            slot: Mutex::new(None),
            segments_written: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start recording the combined call. Starting an active recording is a no-op.
    pub async fn start(&self) -> Result<(), RecordingError> {
        let mut slot = self.slot.lock().await;

        if slot.is_some() {
            warn!("Recording already active for {}", self.session_id);
            return Ok(());
        }

        if !self.consent.recording_consent() {
            warn!(
                "Recording refused for {}: no video recording consent",
                self.session_id
            );
            return Err(RecordingError::ConsentRequired);
        }

        let feed = self
            .media
            .subscribe_frames()
            .await
            .ok_or(RecordingError::MediaUnavailable)?;

        let recording_id = uuid::Uuid::new_v4().to_string();
        info!("Starting recording {} for {}", recording_id, self.session_id);

        let segment_config = SegmentConfig {
            segment_duration: self.config.segment_duration,
            session_id: self.session_id.clone(),
            recording_id: recording_id.clone(),
        };
        let failed = Arc::new(AtomicBool::new(false));
        let mut sink = SegmentedSink::new(
            segment_config,
            Arc::clone(&self.blobs),
            Arc::clone(&self.segments_written),
            Arc::clone(&failed),
        );
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move { sink.record(feed, stop_rx).await });

        *slot = Some(ActiveRecording {
            recording_id,
            started_at: Utc::now(),
            stop_tx,
            task,
            failed,
        });

        info!("Recording started for {}", self.session_id);
        Ok(())
    }

    /// Flush buffered segments and mark inactive. `None` when nothing was recording.
    ///
    /// A storage failure still yields a summary of the segments that were
    /// stored, with `failure` set.
    pub async fn stop(&self) -> Result<Option<RecordingSummary>, RecordingError> {
        let mut slot = self.slot.lock().await;

        let Some(active) = slot.take() else {
            return Ok(None);
        };

        info!("Stopping recording for {}", self.session_id);

        // The sink also ends on its own if the media feed closed first
        let _ = active.stop_tx.send(());

        let report = match active.task.await {
            Ok(report) => report,
            Err(e) => {
                error!("Recording task panicked for {}: {}", self.session_id, e);
                return Err(RecordingError::SinkFailed(e.to_string()));
            }
        };

        let stopped_at = Utc::now();
        let duration = stopped_at.signed_duration_since(active.started_at);

        match &report.failure {
            Some(e) => error!(
                "Recording {} for {} incomplete, {} segments kept: {}",
                active.recording_id,
                self.session_id,
                report.segments.len(),
                e
            ),
            None => info!(
                "Recording stopped for {} ({} segments)",
                self.session_id,
                report.segments.len()
            ),
        }

        Ok(Some(RecordingSummary {
            session_id: self.session_id.clone(),
            recording_id: active.recording_id,
            started_at: active.started_at,
            stopped_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            segments: report.segments,
            failure: report.failure.map(|e| e.to_string()),
        }))
    }

    /// True while a sink is taking frames
    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.as_ref().is_some_and(|a| a.is_running())
    }

    pub async fn state(&self) -> RecordingState {
        let slot = self.slot.lock().await;
        RecordingState {
            active: slot.as_ref().is_some_and(|a| a.is_running()),
            started_at: slot.as_ref().map(|a| a.started_at),
            segments_written: self.segments_written.load(Ordering::SeqCst),
            sink_failed: slot
                .as_ref()
                .is_some_and(|a| a.failed.load(Ordering::SeqCst)),
        }
    }
}
