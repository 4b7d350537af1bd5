//! Live media for a verification call
//!
//! This module owns every ephemeral media resource of an attempt:
//! - Local capture (camera + microphone) through a `CaptureBackend`
//! - Peer connection negotiation with the agent over a `SignalingChannel`
//! - A combined local+remote frame feed for the recorder
//! - Idempotent teardown

pub mod backend;
pub mod frame;
pub mod manager;
pub mod peer;
pub mod signaling;

pub use backend::{
    CaptureBackend, CaptureBackendFactory, CaptureConstraints, CaptureSource, CaptureStream,
    TestPatternCapture, TrackInfo,
};
pub use frame::{FrameOrigin, MediaFrame, MediaKind};
pub use manager::{ConnectionStatus, MediaConfig, MediaSessionManager, MediaState};
pub use peer::{PeerConnection, RelayPeer};
pub use signaling::{
    spawn_auto_answer, ChannelSignaling, IceCandidate, SignalMessage, SignalingChannel,
};
