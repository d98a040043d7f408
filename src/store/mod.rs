//! Persistence: blob storage seam and the append-only change log.

pub mod blob;
pub mod changelog;

pub use blob::{BlobStore, FsBlobStore};
pub use changelog::ChangeLogStore;
