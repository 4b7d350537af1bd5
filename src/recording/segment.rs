use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tracing::{error, info, warn};

use crate::error::RecordingError;
use crate::media::{FrameOrigin, MediaFrame, MediaKind};
use crate::storage::{BlobRef, BlobStore};

/// Segment configuration
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Duration of each segment (default: 300s)
    pub segment_duration: Duration,
    /// Session ID (used for segment paths)
    pub session_id: String,
    /// One id per start/stop cycle, so later recordings never overwrite earlier ones
    pub recording_id: String,
}

impl SegmentConfig {
    /// Blob prefix holding every segment of this recording
    pub fn prefix(&self) -> String {
        format!("recordings/{}/{}", self.session_id, self.recording_id)
    }
}

/// Metadata for a single stored segment
#[derive(Debug, Clone, Serialize)]
pub struct SegmentMetadata {
    /// Segment number (0-indexed)
    pub index: usize,
    pub blob_path: String,
    pub blob_ref: BlobRef,
    /// First frame timestamp in milliseconds
    pub start_ms: u64,
    /// Last frame timestamp in milliseconds
    pub end_ms: u64,
    pub frame_count: usize,
    pub bytes: usize,
}

/// What a sink run produced. Segments stored before a failure are kept.
#[derive(Debug)]
pub struct SinkReport {
    pub segments: Vec<SegmentMetadata>,
    pub failure: Option<RecordingError>,
}

/// Segmented recording sink
///
/// Receives frames from the media feed and stores them in fixed-duration
/// segments, each written to blob storage once complete. A failed write ends
/// the run: the sink stops taking frames and makes one last attempt to store
/// what it holds.
pub struct SegmentedSink {
    config: SegmentConfig,
    blobs: Arc<dyn BlobStore>,
    current: Option<SegmentBuffer>,
    segment_index: usize,
    written: Arc<AtomicUsize>,
    failed: Arc<AtomicBool>,
}

impl SegmentedSink {
    pub fn new(
        config: SegmentConfig,
        blobs: Arc<dyn BlobStore>,
        written: Arc<AtomicUsize>,
        failed: Arc<AtomicBool>,
    ) -> Self {
        info!(
            "Segmented sink initialized: {} (segments: {}s each)",
            config.prefix(),
            config.segment_duration.as_secs()
        );

        Self {
            config,
            blobs,
            current: None,
            segment_index: 0,
            written,
            failed,
        }
    }

    /// Record until `stop` fires, the feed closes or a write fails, then flush
    pub async fn record(
        &mut self,
        mut feed: broadcast::Receiver<MediaFrame>,
        mut stop: oneshot::Receiver<()>,
    ) -> SinkReport {
        let mut segments = Vec::new();
        let mut unstored = Vec::new();
        let mut failure = None;

        info!("Starting segmented recording for {}", self.config.prefix());

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                received = feed.recv() => match received {
                    Ok(frame) => {
                        if let Some(full) = self.write_frame(frame) {
                            if let Err(e) = self.store(full, &mut segments, &mut unstored).await {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Recording sink lagged, {} frames dropped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        // Drain frames already buffered in the feed
        while failure.is_none() {
            match feed.try_recv() {
                Ok(frame) => {
                    if let Some(full) = self.write_frame(frame) {
                        if let Err(e) = self.store(full, &mut segments, &mut unstored).await {
                            failure = Some(e);
                        }
                    }
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }

        // Last attempt for everything still held, in segment order
        let mut remaining = unstored;
        remaining.extend(self.current.take());
        for buffer in remaining {
            match self.flush(&buffer).await {
                Ok(done) => {
                    info!(
                        "Final segment {} stored: {:.1}s - {:.1}s ({} frames)",
                        done.index,
                        done.start_ms as f64 / 1000.0,
                        done.end_ms as f64 / 1000.0,
                        done.frame_count
                    );
                    segments.push(done);
                }
                Err(e) => {
                    error!(
                        "Segment {} of {} lost ({} frames): {}",
                        buffer.index,
                        self.config.prefix(),
                        buffer.frame_count,
                        e
                    );
                    failure.get_or_insert(e);
                }
            }
        }
        segments.sort_by_key(|s| s.index);

        if failure.is_some() {
            self.failed.store(true, Ordering::SeqCst);
        }

        info!(
            "Segmented recording complete for {}: {} segments",
            self.config.prefix(),
            segments.len()
        );

        SinkReport { segments, failure }
    }

    /// Store a full segment; on failure it is kept for the final attempt
    async fn store(
        &self,
        buffer: SegmentBuffer,
        segments: &mut Vec<SegmentMetadata>,
        unstored: &mut Vec<SegmentBuffer>,
    ) -> Result<(), RecordingError> {
        match self.flush(&buffer).await {
            Ok(done) => {
                info!(
                    "Segment {} stored: {:.1}s - {:.1}s ({} frames)",
                    done.index,
                    done.start_ms as f64 / 1000.0,
                    done.end_ms as f64 / 1000.0,
                    done.frame_count
                );
                segments.push(done);
                Ok(())
            }
            Err(e) => {
                warn!("Segment {} write failed, stopping sink: {}", buffer.index, e);
                self.failed.store(true, Ordering::SeqCst);
                unstored.push(buffer);
                Err(e)
            }
        }
    }

    /// Buffer `frame`, returning the segment it closed if it started a new one
    fn write_frame(&mut self, frame: MediaFrame) -> Option<SegmentBuffer> {
        let mut finished = None;

        if self.should_start_new_segment(&frame) {
            finished = self.current.take();
            self.current = Some(SegmentBuffer::new(self.segment_index, frame.timestamp_ms));
            self.segment_index += 1;
        }

        if let Some(buffer) = &mut self.current {
            buffer.push(&frame);
        }

        finished
    }

    fn should_start_new_segment(&self, frame: &MediaFrame) -> bool {
        match &self.current {
            None => true,
            Some(buffer) => {
                let segment_ms = self.config.segment_duration.as_millis() as u64;
                frame.timestamp_ms.saturating_sub(buffer.start_ms) >= segment_ms
            }
        }
    }

    async fn flush(&self, buffer: &SegmentBuffer) -> Result<SegmentMetadata, RecordingError> {
        let blob_path = format!("{}/segment-{:03}.bin", self.config.prefix(), buffer.index);

        let blob_ref = self
            .blobs
            .put(&blob_path, &buffer.bytes)
            .await
            .map_err(|e| RecordingError::SinkFailed(e.to_string()))?;

        self.written.fetch_add(1, Ordering::SeqCst);

        Ok(SegmentMetadata {
            index: buffer.index,
            blob_path,
            blob_ref,
            start_ms: buffer.start_ms,
            end_ms: buffer.end_ms,
            frame_count: buffer.frame_count,
            bytes: buffer.bytes.len(),
        })
    }
}

/// Frames of one segment, length-prefixed:
/// `[kind u8][origin u8][timestamp_ms u64 LE][len u32 LE][payload]`
struct SegmentBuffer {
    index: usize,
    start_ms: u64,
    end_ms: u64,
    frame_count: usize,
    bytes: Vec<u8>,
}

impl SegmentBuffer {
    fn new(index: usize, start_ms: u64) -> Self {
        Self {
            index,
            start_ms,
            end_ms: start_ms,
            frame_count: 0,
            bytes: Vec::new(),
        }
    }

    fn push(&mut self, frame: &MediaFrame) {
        let kind = match frame.kind {
            MediaKind::Audio => 0u8,
            MediaKind::Video => 1u8,
        };
        let origin = match frame.origin {
            FrameOrigin::Local => 0u8,
            FrameOrigin::Remote => 1u8,
        };

        self.bytes.push(kind);
        self.bytes.push(origin);
        self.bytes.extend_from_slice(&frame.timestamp_ms.to_le_bytes());
        self.bytes
            .extend_from_slice(&(frame.payload.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(&frame.payload);

        self.end_ms = self.end_ms.max(frame.timestamp_ms);
        self.frame_count += 1;
    }
}
