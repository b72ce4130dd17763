//! Core rechunking engine.
//!
//! This crate converts the chunk layout of an N-dimensional dataset from one
//! chunk scheme to another without materializing the dataset:
//! - Chunk schemes and the chunk grids they induce
//! - Splitting oversized chunks under a memory budget
//! - Mapping source chunks onto destination chunks
//! - Assembling destination chunks from their pieces
//! - Planning and validating a rechunk job up front

pub mod buffer;
pub mod chunk;
pub mod config;
pub mod consolidate;
pub mod dataset;
pub mod error;
pub mod indexer;
pub mod key;
pub mod planner;
pub mod scheme;
pub mod shuffle;
pub mod splitter;
pub mod template;

pub use buffer::ChunkData;
pub use chunk::{Chunk, IndexRegion};
pub use config::{DEFAULT_CONCURRENCY, DEFAULT_MAX_MEM, JobConfig, RechunkConfig, StorageConfig};
pub use consolidate::Consolidator;
pub use dataset::{DatasetDescriptor, Variable};
pub use error::{Error, Result};
pub use indexer::{ChunkIndexer, DimGrid};
pub use key::ChunkKey;
pub use planner::{PlanSummary, RechunkPlan, RechunkPlanner};
pub use scheme::{ChunkScheme, ChunkSpec, FULL_DIMENSION};
pub use shuffle::{ChunkPiece, ShuffleGrouper, overlapping_indices};
pub use splitter::{Splitter, split_lengths};
pub use template::{Template, TemplateVariable, derive_template};
