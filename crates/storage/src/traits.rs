//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use rechunk_core::{ChunkData, ChunkKey, DatasetDescriptor, Template};

/// Flat key/value object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's full contents.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object, replacing any existing one.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List object keys under a prefix, in no particular order.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Backend name, for logging.
    fn backend_name(&self) -> &'static str;
}

/// Read access to a chunked store.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Template describing the stored dataset and its chunk layout.
    async fn read_template(&self) -> StorageResult<Template>;

    /// One variable's buffer for the chunk `key`.
    async fn read_chunk(&self, key: &ChunkKey, variable: &str) -> StorageResult<Bytes>;

    /// Every variable of `descriptor` for the chunk `key`.
    async fn read_chunk_data(
        &self,
        descriptor: &DatasetDescriptor,
        key: &ChunkKey,
    ) -> StorageResult<ChunkData> {
        let mut data = ChunkData::new();
        for name in descriptor.variables.keys() {
            let bytes = self.read_chunk(key, name).await?;
            data.insert(name.clone(), bytes);
        }
        Ok(data)
    }
}

/// Write access to a chunked store.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Initialize the store layout. Called once before any chunk write.
    async fn write_template(&self, template: &Template) -> StorageResult<()>;

    /// Write one variable's buffer for the chunk `key`.
    async fn write_chunk(&self, key: &ChunkKey, variable: &str, data: Bytes) -> StorageResult<()>;

    /// Write every variable of a chunk.
    async fn write_chunk_data(&self, key: &ChunkKey, data: &ChunkData) -> StorageResult<()> {
        for (name, bytes) in data.iter() {
            self.write_chunk(key, name, bytes.clone()).await?;
        }
        Ok(())
    }
}
