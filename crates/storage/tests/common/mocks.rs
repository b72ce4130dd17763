use async_trait::async_trait;
use bytes::Bytes;
use rechunk_storage::error::{StorageError, StorageResult};
use rechunk_storage::{MemoryBackend, ObjectStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Memory backend that counts reads and writes.
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingBackend {
    pub inner: MemoryBackend,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

#[allow(dead_code)]
impl CountingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for CountingBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

/// Backend whose every operation fails with an I/O error.
#[allow(dead_code)]
pub struct FailingBackend;

#[async_trait]
impl ObjectStore for FailingBackend {
    async fn exists(&self, _key: &str) -> StorageResult<bool> {
        Err(StorageError::Io(std::io::Error::other("failing backend")))
    }

    async fn get(&self, _key: &str) -> StorageResult<Bytes> {
        Err(StorageError::Io(std::io::Error::other("failing backend")))
    }

    async fn put(&self, _key: &str, _data: Bytes) -> StorageResult<()> {
        Err(StorageError::Io(std::io::Error::other("failing backend")))
    }

    async fn delete(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::Io(std::io::Error::other("failing backend")))
    }

    async fn list(&self, _prefix: &str) -> StorageResult<Vec<String>> {
        Err(StorageError::Io(std::io::Error::other("failing backend")))
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
