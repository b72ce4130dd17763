//! Chunked dataset storage for rechunk jobs.
//!
//! This crate provides:
//! - A flat object store abstraction with filesystem and in-memory backends
//! - The chunk source and sink collaborators read and written by a rechunk job
//! - The object key layout of a chunked store

pub mod backends;
pub mod chunk_store;
pub mod error;
pub mod layout;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use chunk_store::ChunkStore;
pub use error::{StorageError, StorageResult};
pub use traits::{ChunkSink, ChunkSource, ObjectStore};

use rechunk_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

/// Open a chunk store from configuration.
pub async fn open_chunk_store(config: &StorageConfig) -> StorageResult<ChunkStore> {
    Ok(ChunkStore::new(from_config(config).await?))
}
