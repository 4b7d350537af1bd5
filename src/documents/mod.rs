//! Per-document-type intake
//!
//! Validation happens locally before any storage call. Each confirmed write
//! replaces the current document of its type and refreshes the read model
//! from the repository.

mod intake;

pub use intake::{validate_document, DocumentFile, DocumentIntake};
