//! Session orchestration
//!
//! `SessionController` is the finite-state machine that sequences consent,
//! media, recording, documents and review for one verification attempt:
//! - `step`: the steps, the transition table and which actions each step accepts
//! - `context`: the session-scoped collaborators handed to the controller
//! - `machine`: guards, side effects and the exit hook

mod context;
mod machine;
mod step;

pub use context::SessionContext;
pub use machine::{SessionController, SessionView};
pub use step::{Edge, SessionAction, Step};
