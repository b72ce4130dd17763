//! Configuration types shared across crates.

use crate::dataset::DatasetDescriptor;
use crate::scheme::ChunkScheme;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default per-worker memory budget: 1 GiB.
pub const DEFAULT_MAX_MEM: u64 = 1024 * 1024 * 1024;

/// Default number of chunks processed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Planner input for one rechunk job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RechunkConfig {
    /// Dimensions and variables of the dataset.
    pub dataset: DatasetDescriptor,
    /// Chunk scheme of the source store.
    pub source_chunks: ChunkScheme,
    /// Chunk scheme of the destination store.
    pub target_chunks: ChunkScheme,
    /// Explicit intermediate split scheme, overriding the memory-based policy.
    #[serde(default)]
    pub split_chunks: Option<ChunkScheme>,
    /// Memory budget per worker in bytes.
    #[serde(default = "default_max_mem")]
    pub max_mem: u64,
}

fn default_max_mem() -> u64 {
    DEFAULT_MAX_MEM
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl RechunkConfig {
    /// Create a config with the default memory budget and no explicit split.
    pub fn new(
        dataset: DatasetDescriptor,
        source_chunks: ChunkScheme,
        target_chunks: ChunkScheme,
    ) -> Self {
        Self {
            dataset,
            source_chunks,
            target_chunks,
            split_chunks: None,
            max_mem: DEFAULT_MAX_MEM,
        }
    }

    /// Set the memory budget.
    pub fn with_max_mem(mut self, max_mem: u64) -> Self {
        self.max_mem = max_mem;
        self
    }

    /// Set an explicit intermediate split scheme.
    pub fn with_split_chunks(mut self, split_chunks: ChunkScheme) -> Self {
        self.split_chunks = Some(split_chunks);
        self
    }

    /// Validate settings that do not depend on the dataset.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_mem == 0 {
            return Err("max_mem must be positive".to_string());
        }
        Ok(())
    }
}

/// Chunk store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory of the store.
        path: PathBuf,
    },
    /// In-process memory storage. Contents are lost when the process exits.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/store"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("filesystem storage requires a non-empty path".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Rechunk job configuration, as loaded by the command-line tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Store holding the source chunks and template.
    pub input: StorageConfig,
    /// Store receiving the destination chunks and template.
    pub output: StorageConfig,
    /// Source chunk scheme. Defaults to the chunk layout recorded in the
    /// input store's template.
    #[serde(default)]
    pub source_chunks: Option<ChunkScheme>,
    /// Destination chunk scheme.
    pub target_chunks: ChunkScheme,
    /// Explicit intermediate split scheme.
    #[serde(default)]
    pub split_chunks: Option<ChunkScheme>,
    /// Memory budget per worker in bytes.
    #[serde(default = "default_max_mem")]
    pub max_mem: u64,
    /// Maximum chunks in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl JobConfig {
    /// Validate job settings.
    pub fn validate(&self) -> Result<(), String> {
        self.input.validate().map_err(|e| format!("input: {e}"))?;
        self.output.validate().map_err(|e| format!("output: {e}"))?;
        if self.input == self.output && self.input != StorageConfig::Memory {
            return Err("input and output must be different stores".to_string());
        }
        if self.max_mem == 0 {
            return Err("max_mem must be positive".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be at least 1".to_string());
        }
        Ok(())
    }

    /// Planner config for `dataset`, using `stored_chunks` when no source
    /// scheme is configured.
    pub fn rechunk_config(
        &self,
        dataset: DatasetDescriptor,
        stored_chunks: ChunkScheme,
    ) -> RechunkConfig {
        RechunkConfig {
            dataset,
            source_chunks: self.source_chunks.clone().unwrap_or(stored_chunks),
            target_chunks: self.target_chunks.clone(),
            split_chunks: self.split_chunks.clone(),
            max_mem: self.max_mem,
        }
    }
}
