use serde::{Deserialize, Serialize};

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Which side of the call produced a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameOrigin {
    /// Subject's own camera and microphone
    Local,
    /// Agent endpoint
    Remote,
}

/// One encoded media frame; the payload is opaque to this crate
#[derive(Debug, Clone)]
pub struct MediaFrame {
    pub kind: MediaKind,
    pub origin: FrameOrigin,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
    pub payload: Vec<u8>,
}
