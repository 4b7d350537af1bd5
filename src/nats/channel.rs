use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::subjects;
use crate::error::SignalingError;
use crate::media::{SignalMessage, SignalingChannel};

/// Signaling channel carried over NATS subjects scoped to one session
pub struct NatsSignalingChannel {
    client: Client,
    session_id: String,
    outbound_subject: String,
    inbound: Option<Subscriber>,
}

impl NatsSignalingChannel {
    /// Open the channel on an existing connection
    pub async fn open(client: Client, session_id: &str) -> Result<Self> {
        let inbound_subject = subjects::inbound(session_id);

        let subscriber = client
            .subscribe(inbound_subject.clone())
            .await
            .context("Failed to subscribe to agent signaling")?;

        info!("Subscribed to {}", inbound_subject);

        Ok(Self {
            client,
            session_id: session_id.to_string(),
            outbound_subject: subjects::outbound(session_id),
            inbound: Some(subscriber),
        })
    }
}

#[async_trait]
impl SignalingChannel for NatsSignalingChannel {
    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        let payload = serde_json::to_vec(&message)
            .map_err(|e| SignalingError::NegotiationFailed(e.to_string()))?;

        self.client
            .publish(self.outbound_subject.clone(), payload.into())
            .await
            .map_err(|e| SignalingError::NegotiationFailed(format!("publish failed: {}", e)))?;

        debug!("Published signaling message to {}", self.outbound_subject);
        Ok(())
    }

    async fn recv(&mut self) -> Option<SignalMessage> {
        let subscriber = self.inbound.as_mut()?;

        while let Some(message) = subscriber.next().await {
            if let Some(signal) = subjects::decode(&message.payload) {
                return Some(signal);
            }
        }

        None
    }

    async fn close(&mut self) {
        if let Some(mut subscriber) = self.inbound.take() {
            if let Err(e) = subscriber.unsubscribe().await {
                warn!("Failed to unsubscribe signaling for {}: {}", self.session_id, e);
            }
            info!("Signaling channel closed for {}", self.session_id);
        }
    }
}
