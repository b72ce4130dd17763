//! Error types for rechunk execution.

use rechunk_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Rechunk(#[from] rechunk_core::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// The core error behind this failure, if any, including core errors
    /// surfaced through storage.
    pub fn as_rechunk_error(&self) -> Option<&rechunk_core::Error> {
        match self {
            PipelineError::Rechunk(e) | PipelineError::Storage(StorageError::Chunk(e)) => Some(e),
            _ => None,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
