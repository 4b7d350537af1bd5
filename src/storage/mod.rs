//! Durable state boundaries: the repository of record and blob storage

mod blob;
mod repository;

pub use blob::{BlobRef, BlobStore, FsBlobStore, MemoryBlobStore};
pub use repository::{InMemoryRepository, Repository};
