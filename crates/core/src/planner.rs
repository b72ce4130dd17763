//! Rechunk planning.
//!
//! The planner validates a [`RechunkConfig`] up front and decides whether
//! source chunks need splitting to respect the memory budget. Everything it
//! produces is derived from chunk grids alone; no data is read.

use crate::chunk::Chunk;
use crate::config::RechunkConfig;
use crate::consolidate::Consolidator;
use crate::dataset::DatasetDescriptor;
use crate::error::{Error, Result};
use crate::indexer::ChunkIndexer;
use crate::key::ChunkKey;
use crate::shuffle::ShuffleGrouper;
use crate::splitter::Splitter;
use crate::template::Template;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Validates a job configuration and chooses the intermediate scheme.
#[derive(Clone, Debug)]
pub struct RechunkPlanner {
    descriptor: DatasetDescriptor,
    source: ChunkIndexer,
    target: ChunkIndexer,
    split_lengths: Option<BTreeMap<String, u64>>,
    max_mem: u64,
}

fn invalid(role: &str, err: Error) -> Error {
    match err {
        Error::Configuration(msg) => Error::Configuration(format!("{role}: {msg}")),
        other => Error::Configuration(format!("{role}: {other}")),
    }
}

impl RechunkPlanner {
    /// Validate `config`. Any invalid scheme or dataset is rejected here,
    /// before a single chunk is read.
    pub fn new(config: RechunkConfig) -> Result<Self> {
        config.validate().map_err(Error::Configuration)?;
        config
            .dataset
            .validate()
            .map_err(|e| invalid("dataset", e))?;
        let source = ChunkIndexer::new(&config.dataset, &config.source_chunks)
            .map_err(|e| invalid("source_chunks", e))?;
        let target = ChunkIndexer::new(&config.dataset, &config.target_chunks)
            .map_err(|e| invalid("target_chunks", e))?;
        let split_lengths = config
            .split_chunks
            .as_ref()
            .map(|scheme| scheme.resolve(&config.dataset))
            .transpose()
            .map_err(|e| invalid("split_chunks", e))?;
        Ok(Self {
            descriptor: config.dataset,
            source,
            target,
            split_lengths,
            max_mem: config.max_mem,
        })
    }

    /// Choose the intermediate scheme.
    ///
    /// Source chunks that fit the budget are not split. An explicit split
    /// scheme takes precedence over the budget-driven policy.
    pub fn plan(&self) -> Result<RechunkPlan> {
        let source_nbytes = self
            .descriptor
            .nbytes_for_extents(&self.source.max_chunk_extents());

        let splitter = match &self.split_lengths {
            Some(lengths) => {
                let splitter = Splitter::with_lengths(&self.source, lengths);
                let nbytes = self.descriptor.nbytes_for_extents(splitter.lengths());
                if nbytes > self.max_mem {
                    warn!(
                        nbytes,
                        max_mem = self.max_mem,
                        "Explicit split chunks exceed the memory budget"
                    );
                }
                Some(splitter)
            }
            None if source_nbytes <= self.max_mem => None,
            None => Some(Splitter::plan(&self.descriptor, &self.source, self.max_mem)?),
        };
        let splitter = splitter.filter(|s| !s.is_noop());

        let plan = RechunkPlan {
            descriptor: self.descriptor.clone(),
            source: self.source.clone(),
            target: self.target.clone(),
            splitter,
            max_mem: self.max_mem,
        };

        let target_nbytes = plan.target_chunk_nbytes();
        if target_nbytes > self.max_mem {
            warn!(
                nbytes = target_nbytes,
                max_mem = self.max_mem,
                "Destination chunks exceed the memory budget and are assembled whole"
            );
        }
        info!(
            source_chunks = plan.source.num_chunks(),
            intermediate_chunks = plan.num_intermediate_chunks(),
            target_chunks = plan.target.num_chunks(),
            split = plan.splitter.is_some(),
            max_intermediate_nbytes = plan.max_intermediate_nbytes(),
            "Planned rechunk"
        );
        Ok(plan)
    }
}

/// A validated rechunk plan.
#[derive(Clone, Debug)]
pub struct RechunkPlan {
    descriptor: DatasetDescriptor,
    source: ChunkIndexer,
    target: ChunkIndexer,
    splitter: Option<Splitter>,
    max_mem: u64,
}

impl RechunkPlan {
    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }

    pub fn source(&self) -> &ChunkIndexer {
        &self.source
    }

    pub fn target(&self) -> &ChunkIndexer {
        &self.target
    }

    /// The splitter, if source chunks must be split.
    pub fn splitter(&self) -> Option<&Splitter> {
        self.splitter.as_ref()
    }

    pub fn max_mem(&self) -> u64 {
        self.max_mem
    }

    /// Chunk lengths after splitting.
    pub fn intermediate_lengths(&self) -> BTreeMap<String, u64> {
        match &self.splitter {
            Some(s) => s.lengths().clone(),
            None => self.source.chunk_lengths(),
        }
    }

    /// Every intermediate chunk, source chunk by source chunk.
    pub fn intermediate_chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        self.source.chunks().flat_map(move |chunk| match &self.splitter {
            Some(s) => s.split(&chunk),
            None => vec![chunk],
        })
    }

    /// Number of intermediate chunks, computed per dimension.
    pub fn num_intermediate_chunks(&self) -> u64 {
        let lengths = self.intermediate_lengths();
        self.source
            .dims()
            .iter()
            .map(|(dim, grid)| {
                let len = lengths.get(dim).copied().unwrap_or(grid.chunk_len).max(1);
                (0..grid.num_chunks())
                    .map(|i| {
                        let r = grid.chunk_range(i);
                        (r.end - r.start).div_ceil(len)
                    })
                    .sum::<u64>()
            })
            .product()
    }

    /// Bytes of the largest intermediate chunk.
    pub fn max_intermediate_nbytes(&self) -> u64 {
        self.descriptor
            .nbytes_for_extents(&self.intermediate_lengths())
    }

    /// Bytes of the largest destination chunk.
    pub fn target_chunk_nbytes(&self) -> u64 {
        self.descriptor
            .nbytes_for_extents(&self.target.max_chunk_extents())
    }

    /// Exact number of pieces each destination key receives.
    pub fn expected_pieces(&self) -> Result<BTreeMap<ChunkKey, usize>> {
        self.shuffle_grouper()
            .expected_pieces(self.intermediate_chunks())
    }

    pub fn shuffle_grouper(&self) -> ShuffleGrouper {
        ShuffleGrouper::new(self.descriptor.clone(), self.target.clone())
    }

    pub fn consolidator(&self) -> Consolidator {
        Consolidator::new(self.descriptor.clone(), self.target.clone())
    }

    /// Check that the source store holds this plan's dataset under this
    /// plan's source chunk grid.
    pub fn check_source_layout(&self, stored: &Template) -> Result<()> {
        let descriptor = stored.descriptor();
        if descriptor.dims != self.descriptor.dims {
            return Err(Error::Configuration(format!(
                "dataset: dimensions {:?} do not match stored dimensions {:?}",
                self.descriptor.dims, descriptor.dims
            )));
        }
        for (name, var) in &self.descriptor.variables {
            match descriptor.variables.get(name) {
                Some(s) if s.dims == var.dims && s.itemsize == var.itemsize => {}
                Some(_) => {
                    return Err(Error::Configuration(format!(
                        "dataset: variable {name} does not match the stored variable"
                    )));
                }
                None => return Err(Error::MissingVariable(name.clone())),
            }
        }
        let layout = stored.indexer();
        if layout != self.source {
            return Err(Error::Configuration(format!(
                "source_chunks: {:?} does not match stored layout {:?}",
                self.source.chunk_lengths(),
                layout.chunk_lengths()
            )));
        }
        Ok(())
    }

    /// Template of the destination store.
    pub fn template(&self) -> Template {
        Template::derive(&self.descriptor, &self.target)
    }

    /// Serializable overview of the plan.
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            source_chunks: self.source.chunk_lengths(),
            target_chunks: self.target.chunk_lengths(),
            split_chunks: self.splitter.as_ref().map(|s| s.lengths().clone()),
            num_source_chunks: self.source.num_chunks(),
            num_intermediate_chunks: self.num_intermediate_chunks(),
            num_target_chunks: self.target.num_chunks(),
            max_intermediate_nbytes: self.max_intermediate_nbytes(),
            target_chunk_nbytes: self.target_chunk_nbytes(),
            max_mem: self.max_mem,
        }
    }
}

/// Overview of a [`RechunkPlan`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub source_chunks: BTreeMap<String, u64>,
    pub target_chunks: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_chunks: Option<BTreeMap<String, u64>>,
    pub num_source_chunks: u64,
    pub num_intermediate_chunks: u64,
    pub num_target_chunks: u64,
    pub max_intermediate_nbytes: u64,
    pub target_chunk_nbytes: u64,
    pub max_mem: u64,
}
