use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{CaptureBackend, CaptureConstraints, TrackInfo};
use super::frame::{MediaFrame, MediaKind};
use super::peer::PeerConnection;
use super::signaling::{SignalMessage, SignalingChannel};
use crate::error::{DeviceError, SignalingError};

/// Configuration for the media session
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Bounded wait for the signaling handshake
    pub signaling_timeout: Duration,

    /// Devices requested from the capture backend
    pub constraints: CaptureConstraints,

    /// Capacity of the combined frame feed
    pub frame_buffer: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            signaling_timeout: Duration::from_secs(30),
            constraints: CaptureConstraints::default(),
            frame_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Idle,
    Acquiring,
    Negotiating,
    Connected,
    Failed,
    Closed,
}

/// Snapshot of the ephemeral media state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaState {
    pub status: ConnectionStatus,
    pub has_local_stream: bool,
    pub has_remote_stream: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

struct LocalTrack {
    info: TrackInfo,
    enabled: Arc<AtomicBool>,
}

struct MediaResources {
    backend: Box<dyn CaptureBackend>,
    peer: Box<dyn PeerConnection>,
    signaling: Box<dyn SignalingChannel>,
    local_tracks: Vec<LocalTrack>,
    remote_stream: bool,
    feed: Option<broadcast::Sender<MediaFrame>>,
    pumps: Vec<JoinHandle<()>>,
}

/// Puts the status back if the operation holding it is dropped midway
struct StatusGuard<'a> {
    status: &'a RwLock<ConnectionStatus>,
    restore: Option<ConnectionStatus>,
}

impl<'a> StatusGuard<'a> {
    fn enter(status: &'a RwLock<ConnectionStatus>, during: ConnectionStatus) -> Self {
        let mut current = status.write().unwrap_or_else(|e| e.into_inner());
        let prior = *current;
        *current = during;
        Self {
            status,
            restore: Some(prior),
        }
    }

    fn commit(mut self, outcome: ConnectionStatus) {
        self.restore = None;
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = outcome;
    }
}

impl Drop for StatusGuard<'_> {
    fn drop(&mut self) {
        if let Some(prior) = self.restore.take() {
            *self.status.write().unwrap_or_else(|e| e.into_inner()) = prior;
        }
    }
}

/// Owns local capture, the peer connection and the signaling channel of one attempt
pub struct MediaSessionManager {
    session_id: String,
    config: MediaConfig,
    status: RwLock<ConnectionStatus>,
    resources: Mutex<MediaResources>,
}

impl MediaSessionManager {
    pub fn new(
        session_id: impl Into<String>,
        config: MediaConfig,
        backend: Box<dyn CaptureBackend>,
        peer: Box<dyn PeerConnection>,
        signaling: Box<dyn SignalingChannel>,
    ) -> Self {
        let session_id = session_id.into();
        info!(
            "Media session for {} using capture backend {}",
            session_id,
            backend.name()
        );

        Self {
            session_id,
            config,
            status: RwLock::new(ConnectionStatus::Idle),
            resources: Mutex::new(MediaResources {
                backend,
                peer,
                signaling,
                local_tracks: Vec::new(),
                remote_stream: false,
                feed: None,
                pumps: Vec::new(),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    /// Connection status; readable while a handshake is in flight
    pub fn status(&self) -> ConnectionStatus {
        *self.status.read().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn state(&self) -> MediaState {
        let res = self.resources.lock().await;
        let enabled = |kind: MediaKind| {
            res.local_tracks
                .iter()
                .any(|t| t.info.kind == kind && t.enabled.load(Ordering::SeqCst))
        };

        MediaState {
            status: self.status(),
            has_local_stream: !res.local_tracks.is_empty() && res.backend.is_capturing(),
            has_remote_stream: res.remote_stream,
            audio_enabled: enabled(MediaKind::Audio),
            video_enabled: enabled(MediaKind::Video),
        }
    }

    /// Acquire camera and microphone. Returns the existing tracks if already acquired.
    pub async fn acquire_local_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Vec<TrackInfo>, DeviceError> {
        let mut res = self.resources.lock().await;

        if self.status() == ConnectionStatus::Closed {
            return Err(DeviceError::DeviceUnavailable(
                "media session already closed".to_string(),
            ));
        }

        if !res.local_tracks.is_empty() {
            debug!("Local capture already acquired for {}", self.session_id);
            return Ok(res.local_tracks.iter().map(|t| t.info.clone()).collect());
        }

        info!(
            "Acquiring local capture for {} via {}",
            self.session_id,
            res.backend.name()
        );
        let guard = StatusGuard::enter(&self.status, ConnectionStatus::Acquiring);

        let stream = match res.backend.acquire(constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Capture acquisition failed for {}: {}", self.session_id, e);
                guard.commit(ConnectionStatus::Failed);
                return Err(e);
            }
        };

        let missing: Vec<MediaKind> = [
            (constraints.audio, MediaKind::Audio),
            (constraints.video, MediaKind::Video),
        ]
        .into_iter()
        .filter(|(wanted, kind)| *wanted && !stream.has_kind(*kind))
        .map(|(_, kind)| kind)
        .collect();
        if !missing.is_empty() {
            warn!(
                "Capture for {} is missing {:?} tracks, releasing it",
                self.session_id, missing
            );
            res.backend.release().await;
            guard.commit(ConnectionStatus::Failed);
            return Err(DeviceError::DeviceUnavailable(format!(
                "capture did not provide {:?}",
                missing
            )));
        }

        let (feed, _) = broadcast::channel(self.config.frame_buffer.max(1));
        let local_tracks: Vec<LocalTrack> = stream
            .tracks
            .iter()
            .map(|info| LocalTrack {
                info: info.clone(),
                enabled: Arc::new(AtomicBool::new(true)),
            })
            .collect();

        let flags: Vec<(MediaKind, Arc<AtomicBool>)> = local_tracks
            .iter()
            .map(|t| (t.info.kind, Arc::clone(&t.enabled)))
            .collect();
        let pump = Self::spawn_local_pump(stream.frames, flags, feed.clone());

        res.local_tracks = local_tracks;
        res.feed = Some(feed);
        res.pumps.push(pump);
        guard.commit(ConnectionStatus::Idle);

        info!(
            "Local capture acquired for {} ({} tracks)",
            self.session_id,
            res.local_tracks.len()
        );

        Ok(stream.tracks)
    }

    /// Run the offer/answer exchange with the agent until connected
    pub async fn initiate_signaling(&self) -> Result<(), SignalingError> {
        let mut res = self.resources.lock().await;

        match self.status() {
            ConnectionStatus::Connected => return Ok(()),
            ConnectionStatus::Closed => {
                return Err(SignalingError::NegotiationFailed(
                    "media session already closed".to_string(),
                ))
            }
            _ => {}
        }

        if res.local_tracks.is_empty() {
            return Err(SignalingError::NegotiationFailed(
                "no local stream acquired".to_string(),
            ));
        }

        info!("Starting signaling handshake for {}", self.session_id);
        let guard = StatusGuard::enter(&self.status, ConnectionStatus::Negotiating);

        let outcome = tokio::time::timeout(
            self.config.signaling_timeout,
            Self::handshake(&self.session_id, &mut res),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                if let Some(remote) = res.peer.take_remote_frames() {
                    if let Some(feed) = res.feed.clone() {
                        res.pumps.push(Self::spawn_remote_pump(remote, feed));
                    }
                    res.remote_stream = true;
                }
                guard.commit(ConnectionStatus::Connected);
                info!("Peer connection established for {}", self.session_id);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Negotiation failed for {}: {}", self.session_id, e);
                res.peer.close().await;
                guard.commit(ConnectionStatus::Failed);
                Err(e)
            }
            Err(_) => {
                let secs = self.config.signaling_timeout.as_secs();
                warn!(
                    "Signaling handshake for {} timed out after {:?}",
                    self.session_id, self.config.signaling_timeout
                );
                res.peer.close().await;
                guard.commit(ConnectionStatus::Failed);
                Err(SignalingError::SignalingTimeout(secs))
            }
        }
    }

    async fn handshake(session_id: &str, res: &mut MediaResources) -> Result<(), SignalingError> {
        let kinds: Vec<MediaKind> = res.local_tracks.iter().map(|t| t.info.kind).collect();
        let sdp = res.peer.create_offer(&kinds).await?;

        res.signaling
            .send(SignalMessage::Offer {
                session_id: session_id.to_string(),
                sdp,
            })
            .await?;
        debug!("Offer sent for {}", session_id);

        while !res.peer.is_connected() {
            let message = res.signaling.recv().await.ok_or_else(|| {
                SignalingError::NegotiationFailed("signaling channel closed".to_string())
            })?;

            if message.session_id() != session_id {
                debug!(
                    "Ignoring signaling message for session {}",
                    message.session_id()
                );
                continue;
            }

            match message {
                SignalMessage::Answer { sdp, .. } => {
                    debug!("Answer received for {}", session_id);
                    res.peer.apply_answer(&sdp).await?;
                }
                SignalMessage::IceCandidate { candidate, .. } => {
                    res.peer.add_ice_candidate(&candidate).await?;
                }
                SignalMessage::Reject { reason, .. } => {
                    return Err(SignalingError::NegotiationFailed(format!(
                        "agent rejected the call: {}",
                        reason
                    )));
                }
                SignalMessage::Hangup { .. } => {
                    return Err(SignalingError::NegotiationFailed(
                        "agent hung up during negotiation".to_string(),
                    ));
                }
                SignalMessage::Offer { .. } => {
                    warn!("Unexpected offer from agent for {}", session_id);
                }
            }
        }

        Ok(())
    }

    /// Enable or disable local tracks of one kind; no-op without a stream
    pub async fn set_local_track_enabled(&self, kind: MediaKind, enabled: bool) {
        let res = self.resources.lock().await;

        let mut toggled = 0;
        for track in res.local_tracks.iter().filter(|t| t.info.kind == kind) {
            track.enabled.store(enabled, Ordering::SeqCst);
            toggled += 1;
        }

        if toggled == 0 {
            debug!("No local {:?} track to toggle for {}", kind, self.session_id);
        } else {
            info!(
                "Local {:?} {} for {}",
                kind,
                if enabled { "enabled" } else { "disabled" },
                self.session_id
            );
        }
    }

    /// Combined local+remote frame feed, if capture is running
    pub async fn subscribe_frames(&self) -> Option<broadcast::Receiver<MediaFrame>> {
        let res = self.resources.lock().await;
        res.feed.as_ref().map(|feed| feed.subscribe())
    }

    /// Stop all local tracks and close the connection. Safe to repeat from any path.
    pub async fn teardown(&self) {
        let mut res = self.resources.lock().await;

        if self.status() == ConnectionStatus::Closed {
            debug!("Media session {} already closed", self.session_id);
            return;
        }

        info!("Tearing down media session {}", self.session_id);

        for pump in res.pumps.drain(..) {
            pump.abort();
        }
        res.feed = None;

        if self.status() == ConnectionStatus::Connected {
            let hangup = SignalMessage::Hangup {
                session_id: self.session_id.clone(),
            };
            if let Err(e) = res.signaling.send(hangup).await {
                debug!("Hangup not delivered for {}: {}", self.session_id, e);
            }
        }

        res.peer.close().await;
        res.signaling.close().await;
        res.backend.release().await;
        res.local_tracks.clear();
        res.remote_stream = false;

        *self.status.write().unwrap_or_else(|e| e.into_inner()) = ConnectionStatus::Closed;
        info!("Media session {} closed", self.session_id);
    }

    fn spawn_local_pump(
        mut frames: mpsc::Receiver<MediaFrame>,
        flags: Vec<(MediaKind, Arc<AtomicBool>)>,
        feed: broadcast::Sender<MediaFrame>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let enabled = flags
                    .iter()
                    .filter(|(kind, _)| *kind == frame.kind)
                    .all(|(_, flag)| flag.load(Ordering::SeqCst));
                if !enabled {
                    continue;
                }
                // No subscribers is fine: frames are only kept while recording
                let _ = feed.send(frame);
            }
            debug!("Local frame pump stopped");
        })
    }

    fn spawn_remote_pump(
        mut frames: mpsc::Receiver<MediaFrame>,
        feed: broadcast::Sender<MediaFrame>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let _ = feed.send(frame);
            }
            debug!("Remote frame pump stopped");
        })
    }
}
