//! Durable records owned by the repository collaborator

mod consent;
mod document;
mod session;

pub use consent::ConsentRecord;
pub use document::{
    DocumentRule, DocumentSet, DocumentType, SessionDocument, VerificationStatus,
    MAX_DOCUMENT_BYTES,
};
pub use session::{SessionStatus, VerificationSession, VerificationTier};
