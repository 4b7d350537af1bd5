use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::media::{CaptureSource, MediaConfig};
use crate::model::MAX_DOCUMENT_BYTES;
use crate::recording::RecordingConfig;
use crate::scheduling::DEFAULT_HORIZON_DAYS;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub media: MediaSection,
    pub signaling: SignalingConfig,
    pub recording: RecordingSection,
    pub documents: DocumentsConfig,
    pub scheduling: SchedulingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "live-verify".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaSection {
    pub signaling_timeout_secs: u64,
    pub capture: CaptureSource,
    pub frame_buffer: usize,
}

impl Default for MediaSection {
    fn default() -> Self {
        Self {
            signaling_timeout_secs: 30,
            capture: CaptureSource::TestPattern,
            frame_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Without a URL the agent side is served in-process
    pub nats_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingSection {
    pub segment_duration_secs: u64,
}

impl Default for RecordingSection {
    fn default() -> Self {
        Self {
            segment_duration_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    pub max_upload_bytes: u64,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: MAX_DOCUMENT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub horizon_days: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub blob_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_root: "~/.live-verify/blobs".to_string(),
        }
    }
}

impl Config {
    /// Load `path` (any format the config crate knows, optional) layered with
    /// `LIVE_VERIFY__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("LIVE_VERIFY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn media_config(&self) -> MediaConfig {
        MediaConfig {
            signaling_timeout: Duration::from_secs(self.media.signaling_timeout_secs),
            frame_buffer: self.media.frame_buffer,
            ..MediaConfig::default()
        }
    }

    pub fn recording_config(&self) -> RecordingConfig {
        RecordingConfig {
            segment_duration: Duration::from_secs(self.recording.segment_duration_secs.max(1)),
        }
    }

    /// Blob root with `~` expanded
    pub fn blob_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage.blob_root).into_owned())
    }
}
