use tracing::warn;

use crate::media::SignalMessage;

/// Subject this process publishes on
pub fn outbound(session_id: &str) -> String {
    format!("verify.signal.{}.subject", session_id)
}

/// Subject the agent console publishes on
pub fn inbound(session_id: &str) -> String {
    format!("verify.signal.{}.agent", session_id)
}

/// Parse one inbound payload. Malformed payloads are logged and skipped.
pub fn decode(payload: &[u8]) -> Option<SignalMessage> {
    match serde_json::from_slice(payload) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("Dropping malformed signaling payload ({} bytes): {}", payload.len(), e);
            None
        }
    }
}
