pub mod config;
pub mod consent;
pub mod controller;
pub mod documents;
pub mod error;
pub mod http;
pub mod media;
pub mod model;
pub mod nats;
pub mod recording;
pub mod review;
pub mod scheduling;
pub mod storage;

pub use config::Config;
pub use consent::ConsentManager;
pub use controller::{SessionAction, SessionContext, SessionController, SessionView, Step};
pub use documents::{DocumentFile, DocumentIntake};
pub use error::SessionError;
pub use http::{create_router, AppState};
pub use media::{MediaConfig, MediaSessionManager};
pub use model::{ConsentRecord, DocumentType, SessionStatus, VerificationSession, VerificationTier};
pub use nats::NatsSignalingChannel;
pub use recording::{RecordingConfig, RecordingManager};
pub use review::ReviewAggregator;
pub use scheduling::SchedulingFrontend;
pub use storage::{FsBlobStore, InMemoryRepository};
