use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::frame::{FrameOrigin, MediaFrame, MediaKind};
use crate::error::DeviceError;

/// What the subject's devices must provide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub audio: bool,
    pub video: bool,
    pub video_width: u32,
    pub video_height: u32,
    pub frame_rate: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            video_width: 1280,
            video_height: 720,
            frame_rate: 15,
        }
    }
}

/// A track handed out by a capture backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub kind: MediaKind,
}

/// Result of a successful acquisition
#[derive(Debug)]
pub struct CaptureStream {
    pub tracks: Vec<TrackInfo>,
    /// Frames from every acquired track
    pub frames: mpsc::Receiver<MediaFrame>,
}

impl CaptureStream {
    pub fn has_kind(&self, kind: MediaKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}

/// Local capture backend trait
///
/// Implementations:
/// - TestPattern: synthetic frames, for headless agents and tests
/// - Device: platform camera/microphone drivers
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Acquire the devices matching `constraints`
    async fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<CaptureStream, DeviceError>;

    /// Stop every track. Must be safe to call when nothing is captured.
    async fn release(&mut self);

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture source selected by configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    /// Synthetic frames generated in-process
    TestPattern,
    /// Named platform device
    Device(String),
}

impl Default for CaptureSource {
    fn default() -> Self {
        CaptureSource::TestPattern
    }
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    pub fn create(source: &CaptureSource) -> Result<Box<dyn CaptureBackend>, DeviceError> {
        match source {
            CaptureSource::TestPattern => Ok(Box::new(TestPatternCapture::new())),
            CaptureSource::Device(name) => Err(DeviceError::DeviceUnavailable(format!(
                "no capture driver available for device {}",
                name
            ))),
        }
    }
}

/// Generates placeholder audio and video frames at the constrained rates
pub struct TestPatternCapture {
    task: Option<JoinHandle<()>>,
}

impl TestPatternCapture {
    const AUDIO_FRAME_MS: u64 = 20;

    pub fn new() -> Self {
        Self { task: None }
    }
}

impl Default for TestPatternCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for TestPatternCapture {
    async fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<CaptureStream, DeviceError> {
        if !constraints.audio && !constraints.video {
            return Err(DeviceError::DeviceUnavailable(
                "no audio or video requested".to_string(),
            ));
        }

        self.release().await;

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(TrackInfo {
                id: format!("audio-{}", uuid::Uuid::new_v4()),
                kind: MediaKind::Audio,
            });
        }
        if constraints.video {
            tracks.push(TrackInfo {
                id: format!("video-{}", uuid::Uuid::new_v4()),
                kind: MediaKind::Video,
            });
        }

        info!(
            "Test pattern capture started ({} tracks, {}x{}@{}fps)",
            tracks.len(),
            constraints.video_width,
            constraints.video_height,
            constraints.frame_rate
        );

        let (tx, rx) = mpsc::channel(100);
        let audio = constraints.audio;
        let video = constraints.video;
        let video_every = (1000 / u64::from(constraints.frame_rate.max(1)))
            .max(Self::AUDIO_FRAME_MS)
            / Self::AUDIO_FRAME_MS;

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(Duration::from_millis(Self::AUDIO_FRAME_MS));
            let mut tick: u64 = 0;

            loop {
                ticker.tick().await;
                let timestamp_ms = started.elapsed().as_millis() as u64;

                if audio {
                    let frame = MediaFrame {
                        kind: MediaKind::Audio,
                        origin: FrameOrigin::Local,
                        timestamp_ms,
                        payload: vec![0u8; 320],
                    };
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }

                if video && tick % video_every == 0 {
                    let frame = MediaFrame {
                        kind: MediaKind::Video,
                        origin: FrameOrigin::Local,
                        timestamp_ms,
                        payload: (0..64u8).map(|b| b.wrapping_add(tick as u8)).collect(),
                    };
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }

                tick += 1;
            }

            debug!("Test pattern capture task stopped");
        });

        self.task = Some(task);

        Ok(CaptureStream { tracks, frames: rx })
    }

    async fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Test pattern capture released");
        }
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "test-pattern"
    }
}
