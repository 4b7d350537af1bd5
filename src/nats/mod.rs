//! NATS transport for the signaling channel
//!
//! Each attempt gets two subjects:
//! - `verify.signal.<session>.subject` carries our offers, candidates and hangups
//! - `verify.signal.<session>.agent` carries the agent console's answers

mod channel;
pub mod subjects;

pub use channel::NatsSignalingChannel;
