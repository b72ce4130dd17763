//! Error types for the rechunk core.

use crate::key::ChunkKey;
use thiserror::Error;

/// Core rechunk error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid chunk size for dimension {dim}: {reason}")]
    ChunkSize { dim: String, reason: String },

    #[error("memory budget exceeded: {required} bytes required, budget is {budget} bytes")]
    MemoryBudgetExceeded { required: u64, budget: u64 },

    #[error(
        "incomplete consolidation of chunk {key}{}: {covered} of {expected} cells received",
        variable_suffix(.variable)
    )]
    IncompleteConsolidation {
        key: ChunkKey,
        variable: Option<String>,
        covered: u64,
        expected: u64,
    },

    #[error(
        "overlapping pieces for chunk {key}{}: {detail}",
        variable_suffix(.variable)
    )]
    OverlapConsolidation {
        key: ChunkKey,
        variable: Option<String>,
        detail: String,
    },

    #[error("invalid chunk key: {0}")]
    InvalidKey(String),

    #[error("buffer size mismatch for variable {variable}: expected {expected} bytes, got {actual}")]
    BufferSize {
        variable: String,
        expected: u64,
        actual: u64,
    },

    #[error("missing variable: {0}")]
    MissingVariable(String),
}

fn variable_suffix(variable: &Option<String>) -> String {
    match variable {
        Some(name) => format!(" (variable {name})"),
        None => String::new(),
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
