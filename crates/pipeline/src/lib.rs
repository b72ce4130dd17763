//! Execution of planned rechunk jobs.
//!
//! A [`Rechunker`] composes the core stages over a chunk source and sink:
//! read each source chunk, split it to the memory budget, cut it into
//! destination pieces, group pieces by destination key, then assemble and
//! write every destination chunk. Distribution is delegated to an
//! [`Executor`]; [`LocalExecutor`] runs both passes on the tokio runtime.
//! With [`PieceStaging`] the pieces are parked in an object store between
//! the passes rather than held in memory.

pub mod error;
pub mod executor;
pub mod rechunker;
pub mod staging;

pub use error::{PipelineError, PipelineResult};
pub use executor::{Executor, LocalExecutor};
pub use rechunker::{RechunkReport, Rechunker, rechunk};
pub use staging::{DEFAULT_STAGING_PREFIX, PieceStaging};
