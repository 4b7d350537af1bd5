use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::Config;
use crate::controller::{SessionContext, SessionController};
use crate::documents::DocumentIntake;
use crate::media::{
    spawn_auto_answer, CaptureBackendFactory, CaptureSource, ChannelSignaling, MediaConfig,
    RelayPeer, SignalingChannel,
};
use crate::model::VerificationSession;
use crate::nats::NatsSignalingChannel;
use crate::recording::RecordingConfig;
use crate::scheduling::{RepositoryScheduler, SchedulingFrontend};
use crate::storage::{BlobStore, Repository};

/// Where the agent side of signaling lives
#[derive(Clone)]
pub enum SignalingMode {
    /// Agent answers in-process
    Loopback,
    /// Agent console reached over NATS
    Nats(async_nats::Client),
}

/// Builds the per-attempt context from shared services
pub struct SessionFactory {
    pub repository: Arc<dyn Repository>,
    pub blobs: Arc<dyn BlobStore>,
    pub documents: Arc<DocumentIntake>,
    pub media: MediaConfig,
    pub capture: CaptureSource,
    pub recording: RecordingConfig,
    pub signaling: SignalingMode,
}

impl SessionFactory {
    pub async fn context(&self, session: VerificationSession) -> Result<SessionContext> {
        let capture = CaptureBackendFactory::create(&self.capture)
            .context("Failed to create capture backend")?;

        let signaling: Box<dyn SignalingChannel> = match &self.signaling {
            SignalingMode::Loopback => {
                let (subject, agent) = ChannelSignaling::pair();
                spawn_auto_answer(agent);
                Box::new(subject)
            }
            SignalingMode::Nats(client) => Box::new(
                NatsSignalingChannel::open(client.clone(), &session.session_id).await?,
            ),
        };

        Ok(SessionContext {
            session,
            repository: Arc::clone(&self.repository),
            blobs: Arc::clone(&self.blobs),
            documents: Arc::clone(&self.documents),
            media: self.media.clone(),
            recording: self.recording.clone(),
            capture,
            peer: Box::new(RelayPeer::new()),
            signaling,
        })
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Open controllers, keyed by session id
    pub sessions: Arc<RwLock<HashMap<String, Arc<Mutex<SessionController>>>>>,

    pub factory: Arc<SessionFactory>,

    pub scheduling: Arc<SchedulingFrontend>,
}

impl AppState {
    pub fn new(
        config: &Config,
        repository: Arc<dyn Repository>,
        blobs: Arc<dyn BlobStore>,
        signaling: SignalingMode,
    ) -> Self {
        let documents = Arc::new(DocumentIntake::with_limit(
            Arc::clone(&repository),
            Arc::clone(&blobs),
            config.documents.max_upload_bytes,
        ));
        let scheduler = Arc::new(RepositoryScheduler::new(Arc::clone(&repository)));

        info!(
            "Service {} ready (capture: {:?}, signaling: {})",
            config.service.name,
            config.media.capture,
            match signaling {
                SignalingMode::Loopback => "loopback",
                SignalingMode::Nats(_) => "nats",
            }
        );

        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            factory: Arc::new(SessionFactory {
                repository,
                blobs,
                documents,
                media: config.media_config(),
                capture: config.media.capture.clone(),
                recording: config.recording_config(),
                signaling,
            }),
            scheduling: Arc::new(SchedulingFrontend::new(
                scheduler,
                config.scheduling.horizon_days,
            )),
        }
    }

    pub async fn controller(&self, session_id: &str) -> Option<Arc<Mutex<SessionController>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Register a freshly opened controller. When another request opened the
    /// same session first, that controller wins and is returned instead.
    pub async fn register(
        &self,
        session_id: &str,
        controller: SessionController,
    ) -> (Arc<Mutex<SessionController>>, Option<SessionController>) {
        let mut sessions = self.sessions.write().await;
        match sessions.get(session_id) {
            Some(existing) => (Arc::clone(existing), Some(controller)),
            None => {
                let controller = Arc::new(Mutex::new(controller));
                sessions.insert(session_id.to_string(), Arc::clone(&controller));
                (controller, None)
            }
        }
    }

    /// Drop a finished controller; its outcome stays in the repository
    pub async fn evict(&self, session_id: &str, controller: &Arc<Mutex<SessionController>>) {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(session_id)
            .is_some_and(|open| Arc::ptr_eq(open, controller))
        {
            sessions.remove(session_id);
            debug!("Session {} finished, controller released", session_id);
        }
    }

    pub async fn open_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}
