use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::SignalingError;

/// ICE candidate exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_mline_index: Option<u16>,
}

/// Negotiation message exchanged with the agent endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    Offer { session_id: String, sdp: String },
    Answer { session_id: String, sdp: String },
    IceCandidate { session_id: String, candidate: IceCandidate },
    /// Agent declined the call
    Reject { session_id: String, reason: String },
    Hangup { session_id: String },
}

impl SignalMessage {
    pub fn session_id(&self) -> &str {
        match self {
            SignalMessage::Offer { session_id, .. }
            | SignalMessage::Answer { session_id, .. }
            | SignalMessage::IceCandidate { session_id, .. }
            | SignalMessage::Reject { session_id, .. }
            | SignalMessage::Hangup { session_id } => session_id,
        }
    }
}

/// Session-scoped, bidirectional message channel to the agent endpoint
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError>;

    /// Next inbound message, `None` once the channel is closed
    async fn recv(&mut self) -> Option<SignalMessage>;

    async fn close(&mut self);
}

/// In-process signaling over tokio channels
pub struct ChannelSignaling {
    outbound: Option<mpsc::Sender<SignalMessage>>,
    inbound: mpsc::Receiver<SignalMessage>,
}

impl ChannelSignaling {
    /// Two connected ends: one for the subject, one for the agent
    pub fn pair() -> (ChannelSignaling, ChannelSignaling) {
        let (a_tx, a_rx) = mpsc::channel(32);
        let (b_tx, b_rx) = mpsc::channel(32);
        (
            ChannelSignaling {
                outbound: Some(a_tx),
                inbound: b_rx,
            },
            ChannelSignaling {
                outbound: Some(b_tx),
                inbound: a_rx,
            },
        )
    }
}

#[async_trait]
impl SignalingChannel for ChannelSignaling {
    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| SignalingError::NegotiationFailed("signaling channel closed".to_string()))?;

        outbound
            .send(message)
            .await
            .map_err(|_| SignalingError::NegotiationFailed("remote endpoint gone".to_string()))
    }

    async fn recv(&mut self) -> Option<SignalMessage> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        if self.outbound.take().is_some() {
            debug!("In-process signaling channel closed");
        }
        self.inbound.close();
    }
}

/// Agent end that answers every offer it receives
///
/// Stands in for the agent console when no message bus is configured.
pub fn spawn_auto_answer(mut agent: ChannelSignaling) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = agent.recv().await {
            match message {
                SignalMessage::Offer { session_id, .. } => {
                    info!("Auto-answering offer for {}", session_id);
                    let answer = SignalMessage::Answer {
                        session_id,
                        sdp: "v=0\r\ns=live-verify-agent\r\nt=0 0\r\n".to_string(),
                    };
                    if agent.send(answer).await.is_err() {
                        break;
                    }
                }
                SignalMessage::Hangup { session_id } => {
                    debug!("Subject hung up on {}", session_id);
                    break;
                }
                _ => {}
            }
        }
        agent.close().await;
    })
}
