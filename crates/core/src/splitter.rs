//! Splitting oversized chunks into sub-chunks that fit a byte budget.

use crate::buffer::ChunkData;
use crate::chunk::{AxisChunks, Chunk, product_chunks};
use crate::dataset::DatasetDescriptor;
use crate::error::{Error, Result};
use crate::indexer::ChunkIndexer;
use std::collections::BTreeMap;
use tracing::debug;

/// Choose per-dimension split lengths so that a chunk of `extents` fits in
/// `max_bytes`.
///
/// Repeatedly takes the contributing dimension with the largest current
/// length (ties broken by name) and divides it by the smallest integer factor
/// that brings the chunk within budget. When no factor on that dimension is
/// enough it is reduced to 1 and the next dimension is considered.
pub fn split_lengths(
    descriptor: &DatasetDescriptor,
    extents: &BTreeMap<String, u64>,
    max_bytes: u64,
) -> Result<BTreeMap<String, u64>> {
    let used = descriptor.used_dims();
    let mut lengths = extents.clone();
    loop {
        let required = descriptor.nbytes_for_extents(&lengths);
        if required <= max_bytes {
            return Ok(lengths);
        }

        let Some((dim, len)) = lengths
            .iter()
            .filter(|(d, l)| **l > 1 && used.contains(d.as_str()))
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(d, l)| (d.clone(), *l))
        else {
            return Err(Error::MemoryBudgetExceeded {
                required,
                budget: max_bytes,
            });
        };

        // The footprint is affine in this dimension's length: per_index * len + rest.
        let mut probe = lengths.clone();
        probe.insert(dim.clone(), 0);
        let rest = descriptor.nbytes_for_extents(&probe);
        probe.insert(dim.clone(), 1);
        let per_index = descriptor.nbytes_for_extents(&probe) - rest;

        let new_len = if rest + per_index > max_bytes {
            1
        } else {
            let fit = (max_bytes - rest) / per_index;
            let factor = len.div_ceil(fit);
            len.div_ceil(factor)
        };
        debug!(dim = %dim, from = len, to = new_len, "Reducing split length");
        lengths.insert(dim, new_len);
    }
}

/// Splits chunks of a source grid into sub-chunks of fixed lengths.
///
/// Sub-chunks are keyed on the refined grid: along each dimension the key is
/// `parent_index * subdivisions + local_index`, where `subdivisions` is the
/// number of sub-chunks in a full-length parent chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Splitter {
    parent_lengths: BTreeMap<String, u64>,
    lengths: BTreeMap<String, u64>,
}

impl Splitter {
    /// Plan split lengths for the largest chunk of `source` under `max_bytes`.
    pub fn plan(
        descriptor: &DatasetDescriptor,
        source: &ChunkIndexer,
        max_bytes: u64,
    ) -> Result<Self> {
        let lengths = split_lengths(descriptor, &source.max_chunk_extents(), max_bytes)?;
        Ok(Self::with_lengths(source, &lengths))
    }

    /// Split with explicit lengths. Missing or oversized lengths fall back to
    /// the source chunk length.
    pub fn with_lengths(source: &ChunkIndexer, lengths: &BTreeMap<String, u64>) -> Self {
        let parent_lengths = source.chunk_lengths();
        let lengths = parent_lengths
            .iter()
            .map(|(dim, &parent)| {
                let len = match lengths.get(dim) {
                    Some(&l) if l > 0 => l.min(parent),
                    _ => parent,
                };
                (dim.clone(), len)
            })
            .collect();
        Self {
            parent_lengths,
            lengths,
        }
    }

    /// Split lengths per dimension.
    pub fn lengths(&self) -> &BTreeMap<String, u64> {
        &self.lengths
    }

    /// Number of sub-chunks along `dim` in a full-length parent chunk.
    pub fn subdivisions(&self, dim: &str) -> u64 {
        match (self.parent_lengths.get(dim), self.lengths.get(dim)) {
            (Some(parent), Some(len)) => parent.div_ceil(*len),
            _ => 1,
        }
    }

    /// Returns true if splitting leaves every chunk unchanged.
    pub fn is_noop(&self) -> bool {
        self.lengths == self.parent_lengths
    }

    /// Sub-chunks exactly tiling `chunk`, in row-major order.
    pub fn split(&self, chunk: &Chunk) -> Vec<Chunk> {
        let axes: Vec<AxisChunks> = chunk
            .region
            .iter()
            .map(|(dim, range)| {
                let len = self
                    .lengths
                    .get(dim)
                    .copied()
                    .unwrap_or(range.end - range.start)
                    .max(1);
                let base = chunk.key.get(dim).unwrap_or(0) * self.subdivisions(dim);
                let mut pieces = Vec::new();
                let mut start = range.start;
                let mut local = 0;
                while start < range.end {
                    let end = (start + len).min(range.end);
                    pieces.push((base + local, start..end));
                    start = end;
                    local += 1;
                }
                (dim.to_string(), pieces)
            })
            .collect();
        product_chunks(&axes)
    }

    /// Split `chunk` and slice its data accordingly.
    pub fn split_data(
        &self,
        descriptor: &DatasetDescriptor,
        chunk: &Chunk,
        data: &ChunkData,
    ) -> Result<Vec<(Chunk, ChunkData)>> {
        data.validate(descriptor, &chunk.region)?;
        self.split(chunk)
            .into_iter()
            .map(|sub| {
                let sliced = data.slice(descriptor, &chunk.region, &sub.region)?;
                Ok((sub, sliced))
            })
            .collect()
    }
}
