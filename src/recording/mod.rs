//! Consent-gated session recording
//!
//! Recording runs next to the live call: a spawned sink consumes the combined
//! local+remote frame feed and writes fixed-duration segments to blob storage.

mod manager;
mod segment;

pub use manager::{RecordingConfig, RecordingManager, RecordingState, RecordingSummary};
pub use segment::{SegmentConfig, SegmentMetadata, SegmentedSink, SinkReport};
