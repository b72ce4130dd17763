//! Chunked dataset storage over an [`ObjectStore`].

use crate::error::{StorageError, StorageResult};
use crate::layout::{TEMPLATE_KEY, chunk_object_key};
use crate::traits::{ChunkSink, ChunkSource, ObjectStore};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use rechunk_core::{ChunkKey, Template};
use std::sync::Arc;
use tracing::instrument;

/// A chunked dataset stored as one object per variable chunk.
///
/// The template is cached after the first read or write.
pub struct ChunkStore {
    store: Arc<dyn ObjectStore>,
    template: RwLock<Option<Arc<Template>>>,
}

impl ChunkStore {
    /// Wrap an object store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            template: RwLock::new(None),
        }
    }

    /// The underlying object store.
    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The store's template, loaded on first use.
    pub async fn template(&self) -> StorageResult<Arc<Template>> {
        let cached = self.template.read().clone();
        if let Some(template) = cached {
            return Ok(template);
        }
        let bytes = self.store.get(TEMPLATE_KEY).await?;
        let template: Arc<Template> = Arc::new(serde_json::from_slice(&bytes)?);
        *self.template.write() = Some(template.clone());
        Ok(template)
    }

    /// Object key and expected byte size of one variable chunk.
    async fn resolve(&self, key: &ChunkKey, variable: &str) -> StorageResult<(String, u64)> {
        let template = self.template().await?;
        let var = template
            .variables
            .get(variable)
            .ok_or_else(|| rechunk_core::Error::MissingVariable(variable.to_string()))?;
        let region = template.indexer().chunk(key)?.region;
        let nbytes = var.dims.iter().map(|d| region.extent(d)).product::<u64>() * var.itemsize;
        Ok((chunk_object_key(variable, &var.dims, key)?, nbytes))
    }
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

#[async_trait]
impl ChunkSource for ChunkStore {
    async fn read_template(&self) -> StorageResult<Template> {
        Ok(self.template().await?.as_ref().clone())
    }

    #[instrument(skip(self), fields(key = %key, backend = self.store.backend_name()))]
    async fn read_chunk(&self, key: &ChunkKey, variable: &str) -> StorageResult<Bytes> {
        let (object, _) = self.resolve(key, variable).await?;
        self.store.get(&object).await
    }
}

#[async_trait]
impl ChunkSink for ChunkStore {
    #[instrument(skip(self, template), fields(backend = self.store.backend_name()))]
    async fn write_template(&self, template: &Template) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(template)?;
        self.store.put(TEMPLATE_KEY, Bytes::from(json)).await?;
        *self.template.write() = Some(Arc::new(template.clone()));
        Ok(())
    }

    #[instrument(skip(self, data), fields(key = %key, backend = self.store.backend_name(), size = data.len()))]
    async fn write_chunk(&self, key: &ChunkKey, variable: &str, data: Bytes) -> StorageResult<()> {
        let (object, expected) = self.resolve(key, variable).await?;
        if data.len() as u64 != expected {
            return Err(StorageError::Chunk(rechunk_core::Error::BufferSize {
                variable: variable.to_string(),
                expected,
                actual: data.len() as u64,
            }));
        }
        self.store.put(&object, data).await
    }
}
