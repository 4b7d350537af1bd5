use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::frame::{MediaFrame, MediaKind};
use super::signaling::IceCandidate;
use crate::error::SignalingError;

/// Peer connection to the agent endpoint
///
/// Codec and transport details stay behind this trait; the engine only drives
/// the offer/answer exchange and watches for the connected state.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Build a local description offering the given tracks
    async fn create_offer(&mut self, tracks: &[MediaKind]) -> Result<String, SignalingError>;

    async fn apply_answer(&mut self, sdp: &str) -> Result<(), SignalingError>;

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), SignalingError>;

    fn is_connected(&self) -> bool;

    /// Frames arriving from the agent, available once after connecting
    fn take_remote_frames(&mut self) -> Option<mpsc::Receiver<MediaFrame>>;

    /// Close the connection. Must be safe to call repeatedly.
    async fn close(&mut self);
}

/// Peer whose media transport is carried by the agent console
///
/// The connection counts as established as soon as a well-formed answer is
/// applied; no remote frames flow through this process.
#[derive(Default)]
pub struct RelayPeer {
    offered: bool,
    connected: bool,
    remote_candidates: Vec<IceCandidate>,
}

impl RelayPeer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeerConnection for RelayPeer {
    async fn create_offer(&mut self, tracks: &[MediaKind]) -> Result<String, SignalingError> {
        if tracks.is_empty() {
            return Err(SignalingError::NegotiationFailed(
                "no local tracks to offer".to_string(),
            ));
        }

        let mut sdp = String::from("v=0\r\ns=live-verify\r\nt=0 0\r\n");
        for kind in tracks {
            let media = match kind {
                MediaKind::Audio => "m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n",
                MediaKind::Video => "m=video 9 UDP/TLS/RTP/SAVPF 96\r\n",
            };
            sdp.push_str(media);
        }

        self.offered = true;
        self.connected = false;
        self.remote_candidates.clear();

        Ok(sdp)
    }

    async fn apply_answer(&mut self, sdp: &str) -> Result<(), SignalingError> {
        if !self.offered {
            return Err(SignalingError::NegotiationFailed(
                "answer received before offer".to_string(),
            ));
        }
        if !sdp.starts_with("v=0") {
            return Err(SignalingError::NegotiationFailed(
                "malformed answer".to_string(),
            ));
        }

        self.connected = true;
        info!("Relay peer connected");
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), SignalingError> {
        debug!("Remote candidate: {}", candidate.candidate);
        self.remote_candidates.push(candidate.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn take_remote_frames(&mut self) -> Option<mpsc::Receiver<MediaFrame>> {
        None
    }

    async fn close(&mut self) {
        self.offered = false;
        self.connected = false;
        self.remote_candidates.clear();
    }
}
