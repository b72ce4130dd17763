//! End-to-end rechunk runs.

use crate::error::PipelineResult;
use crate::executor::Executor;
use crate::staging::PieceStaging;
use rechunk_core::{
    Chunk, ChunkKey, ChunkPiece, Consolidator, RechunkConfig, RechunkPlan, RechunkPlanner,
    ShuffleGrouper,
};
use rechunk_storage::{ChunkSink, ChunkSource};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters for one completed run.
///
/// Byte counts are per chunk buffer. A variable lacking some dimension is
/// stored in every chunk along that dimension, so `bytes_read` and
/// `bytes_written` differ whenever source and destination chunk counts do.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RechunkReport {
    pub source_chunks: u64,
    pub intermediate_chunks: u64,
    pub pieces: u64,
    pub destination_chunks: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Output of the read-split-shuffle pass for one source chunk.
struct Shuffled {
    bytes_read: u64,
    intermediate_chunks: u64,
    num_pieces: u64,
    /// Empty when pieces were staged.
    pieces: Vec<ChunkPiece>,
}

/// Executes a [`RechunkPlan`] against a source and a sink.
pub struct Rechunker {
    plan: Arc<RechunkPlan>,
    grouper: Arc<ShuffleGrouper>,
    consolidator: Arc<Consolidator>,
    source: Arc<dyn ChunkSource>,
    sink: Arc<dyn ChunkSink>,
    staging: Option<PieceStaging>,
}

impl Rechunker {
    pub fn new(plan: RechunkPlan, source: Arc<dyn ChunkSource>, sink: Arc<dyn ChunkSink>) -> Self {
        Self {
            grouper: Arc::new(plan.shuffle_grouper()),
            consolidator: Arc::new(plan.consolidator()),
            plan: Arc::new(plan),
            source,
            sink,
            staging: None,
        }
    }

    /// Park pieces in `staging` between the passes instead of holding them
    /// all in memory.
    pub fn with_staging(mut self, staging: PieceStaging) -> Self {
        self.staging = Some(staging);
        self
    }

    pub fn plan(&self) -> &RechunkPlan {
        &self.plan
    }

    /// Run the job.
    ///
    /// The source store's template is checked against the plan before the
    /// destination template is written. Source chunks are read, split and
    /// cut into pieces; pieces are grouped by destination key and every
    /// destination chunk is assembled and written. Nothing is written for a
    /// destination chunk whose pieces fail to tile it.
    pub async fn run<E: Executor>(&self, executor: &E) -> PipelineResult<RechunkReport> {
        let expected = self.plan.expected_pieces()?;
        let stored = self.source.read_template().await?;
        self.plan.check_source_layout(&stored)?;
        if let Some(staging) = &self.staging {
            let stale = staging.clear().await?;
            if stale > 0 {
                warn!(prefix = staging.prefix(), stale, "Removed stale staged pieces");
            }
        }
        self.sink.write_template(&self.plan.template()).await?;
        info!(
            source_chunks = self.plan.source().num_chunks(),
            destination_chunks = expected.len(),
            staged = self.staging.is_some(),
            "Starting rechunk"
        );

        let source_chunks: Vec<Chunk> = self.plan.source().chunks().collect();
        let shuffled = {
            let plan = self.plan.clone();
            let grouper = self.grouper.clone();
            let source = self.source.clone();
            let staging = self.staging.clone();
            executor
                .distribute(source_chunks, move |chunk| {
                    let plan = plan.clone();
                    let grouper = grouper.clone();
                    let source = source.clone();
                    let staging = staging.clone();
                    async move {
                        shuffle_source_chunk(&plan, &grouper, source.as_ref(), staging.as_ref(), chunk)
                            .await
                    }
                })
                .await?
        };

        let mut report = RechunkReport {
            source_chunks: shuffled.len() as u64,
            ..RechunkReport::default()
        };
        let mut pairs = Vec::new();
        for out in shuffled {
            report.bytes_read += out.bytes_read;
            report.intermediate_chunks += out.intermediate_chunks;
            report.pieces += out.num_pieces;
            pairs.extend(out.pieces.into_iter().map(|p| (p.key.clone(), p)));
        }
        info!(
            intermediate_chunks = report.intermediate_chunks,
            pieces = report.pieces,
            bytes_read = report.bytes_read,
            "Shuffled source chunks"
        );

        let written = match &self.staging {
            Some(staging) => self.consolidate_staged(executor, staging, expected).await?,
            None => {
                let bundles = bundle_pieces(executor.group_by_key(pairs).await?, &expected);
                self.consolidate_bundles(executor, bundles).await?
            }
        };
        report.destination_chunks = written.len() as u64;
        report.bytes_written = written.iter().sum();

        info!(
            destination_chunks = report.destination_chunks,
            bytes_written = report.bytes_written,
            "Rechunk complete"
        );
        Ok(report)
    }

    async fn consolidate_bundles<E: Executor>(
        &self,
        executor: &E,
        bundles: Vec<(ChunkKey, Vec<ChunkPiece>)>,
    ) -> PipelineResult<Vec<u64>> {
        let consolidator = self.consolidator.clone();
        let sink = self.sink.clone();
        executor
            .distribute(bundles, move |(key, pieces)| {
                let consolidator = consolidator.clone();
                let sink = sink.clone();
                async move { write_destination_chunk(&consolidator, sink.as_ref(), &key, &pieces).await }
            })
            .await
    }

    /// Assemble destination chunks one key at a time from staged pieces,
    /// deleting each key's pieces once its chunk is written.
    async fn consolidate_staged<E: Executor>(
        &self,
        executor: &E,
        staging: &PieceStaging,
        expected: BTreeMap<ChunkKey, usize>,
    ) -> PipelineResult<Vec<u64>> {
        let written = {
            let consolidator = self.consolidator.clone();
            let sink = self.sink.clone();
            let staging = staging.clone();
            executor
                .distribute(expected.into_iter().collect(), move |(key, count)| {
                    let consolidator = consolidator.clone();
                    let sink = sink.clone();
                    let staging = staging.clone();
                    async move {
                        let pieces = staging.get(&key).await?;
                        if pieces.len() != count {
                            warn!(key = %key, expected = count, received = pieces.len(), "Unexpected piece count");
                        }
                        let nbytes =
                            write_destination_chunk(&consolidator, sink.as_ref(), &key, &pieces).await?;
                        staging.remove(&key).await?;
                        Ok(nbytes)
                    }
                })
                .await?
        };
        let leftover = staging.clear().await?;
        if leftover > 0 {
            warn!(prefix = staging.prefix(), leftover, "Pieces for unplanned destination keys");
        }
        Ok(written)
    }
}

async fn write_destination_chunk(
    consolidator: &Consolidator,
    sink: &dyn ChunkSink,
    key: &ChunkKey,
    pieces: &[ChunkPiece],
) -> PipelineResult<u64> {
    let data = consolidator.consolidate(key, pieces)?;
    sink.write_chunk_data(key, &data).await?;
    debug!(key = %key, pieces = pieces.len(), "Wrote destination chunk");
    Ok(data.nbytes())
}

async fn shuffle_source_chunk(
    plan: &RechunkPlan,
    grouper: &ShuffleGrouper,
    source: &dyn ChunkSource,
    staging: Option<&PieceStaging>,
    chunk: Chunk,
) -> PipelineResult<Shuffled> {
    let key = chunk.key.clone();
    let data = source.read_chunk_data(plan.descriptor(), &key).await?;
    data.validate(plan.descriptor(), &chunk.region)?;
    let bytes_read = data.nbytes();

    let parts = match plan.splitter() {
        Some(splitter) => splitter.split_data(plan.descriptor(), &chunk, &data)?,
        None => vec![(chunk, data)],
    };
    let intermediate_chunks = parts.len() as u64;

    let mut pieces = Vec::new();
    let mut num_pieces = 0u64;
    for (sub, sub_data) in &parts {
        for piece in grouper.shuffle(sub, sub_data)? {
            num_pieces += 1;
            match staging {
                Some(staging) => staging.put(&piece).await?,
                None => pieces.push(piece),
            }
        }
    }
    debug!(
        key = %key,
        intermediate_chunks,
        pieces = num_pieces,
        "Shuffled source chunk"
    );
    Ok(Shuffled {
        bytes_read,
        intermediate_chunks,
        num_pieces,
        pieces,
    })
}

/// Pair every expected destination key with its pieces.
///
/// A key that received nothing gets an empty bundle so consolidation reports
/// it as incomplete. Count mismatches are logged and left to consolidation.
fn bundle_pieces(
    groups: Vec<(ChunkKey, Vec<ChunkPiece>)>,
    expected: &BTreeMap<ChunkKey, usize>,
) -> Vec<(ChunkKey, Vec<ChunkPiece>)> {
    let mut groups: BTreeMap<ChunkKey, Vec<ChunkPiece>> = groups.into_iter().collect();
    let mut bundles = Vec::with_capacity(expected.len().max(groups.len()));
    for (key, &count) in expected {
        let pieces = groups.remove(key).unwrap_or_default();
        if pieces.len() != count {
            warn!(key = %key, expected = count, received = pieces.len(), "Unexpected piece count");
        }
        bundles.push((key.clone(), pieces));
    }
    for (key, pieces) in groups {
        warn!(key = %key, received = pieces.len(), "Pieces for unplanned destination key");
        bundles.push((key, pieces));
    }
    bundles
}

/// Plan `config` and run it.
///
/// Configuration errors surface before any chunk is read.
pub async fn rechunk<E: Executor>(
    config: RechunkConfig,
    source: Arc<dyn ChunkSource>,
    sink: Arc<dyn ChunkSink>,
    executor: &E,
) -> PipelineResult<RechunkReport> {
    let plan = RechunkPlanner::new(config)?.plan()?;
    Rechunker::new(plan, source, sink).run(executor).await
}
