//! Mapping source chunks onto destination chunks.
//!
//! For every source chunk the [`ShuffleGrouper`] finds the destination chunks
//! its range overlaps and slices its data into one [`ChunkPiece`] per
//! destination. The destination key set and the number of pieces each key
//! receives depend only on the two chunk grids, so they can be computed
//! before any data is read.
//!
//! Every piece carries every variable. A variable lacking some dimension
//! therefore reaches a destination chunk once per source chunk along that
//! dimension; the copies are reconciled at consolidation.

use crate::buffer::ChunkData;
use crate::chunk::{AxisChunks, Chunk, IndexRegion, product_chunks};
use crate::dataset::DatasetDescriptor;
use crate::error::{Error, Result};
use crate::indexer::ChunkIndexer;
use crate::key::ChunkKey;
use std::collections::BTreeMap;
use std::ops::{Range, RangeInclusive};
use tracing::debug;

/// A contribution from one source chunk to one destination chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkPiece {
    /// Destination chunk key.
    pub key: ChunkKey,
    /// Start of the contributed range relative to the destination origin.
    pub offset: BTreeMap<String, u64>,
    /// Extent of the contributed range per dimension.
    pub shape: BTreeMap<String, u64>,
    /// Data covering exactly the contributed range.
    pub data: ChunkData,
}

impl ChunkPiece {
    /// The contributed range in destination-relative coordinates.
    pub fn relative_region(&self) -> IndexRegion {
        IndexRegion::from_ranges(self.offset.iter().map(|(dim, &start)| {
            let len = self.shape.get(dim).copied().unwrap_or(0);
            (dim.clone(), start..start + len)
        }))
    }

    /// Number of cells covered.
    pub fn num_cells(&self) -> u64 {
        self.shape.values().product()
    }
}

/// Destination chunk indices overlapped by `range` on a grid of chunk length `len`.
pub fn overlapping_indices(range: &Range<u64>, len: u64) -> RangeInclusive<u64> {
    (range.start / len)..=((range.end - 1) / len)
}

/// Computes destination overlaps and slices source chunks into pieces.
#[derive(Clone, Debug)]
pub struct ShuffleGrouper {
    descriptor: DatasetDescriptor,
    target: ChunkIndexer,
}

impl ShuffleGrouper {
    /// Create a grouper for the destination grid `target`.
    pub fn new(descriptor: DatasetDescriptor, target: ChunkIndexer) -> Self {
        Self { descriptor, target }
    }

    /// The destination grid.
    pub fn target(&self) -> &ChunkIndexer {
        &self.target
    }

    /// Destination chunks overlapped by `region`, in row-major key order.
    pub fn destination_chunks(&self, region: &IndexRegion) -> Result<Vec<Chunk>> {
        let mut axes: Vec<AxisChunks> = Vec::with_capacity(self.target.dims().len());
        for (dim, grid) in self.target.dims() {
            let range = region
                .range(dim)
                .ok_or_else(|| Error::InvalidKey(format!("region {region:?} lacks dimension {dim}")))?;
            if range.start >= range.end || range.end > grid.size {
                return Err(Error::InvalidKey(format!(
                    "range {}..{} is invalid for dimension {dim} of size {}",
                    range.start, range.end, grid.size
                )));
            }
            let candidates = overlapping_indices(range, grid.chunk_len)
                .map(|i| (i, grid.chunk_range(i)))
                .collect();
            axes.push((dim.clone(), candidates));
        }
        if region.dims().count() != axes.len() {
            return Err(Error::InvalidKey(format!(
                "region {region:?} has dimensions outside the destination grid"
            )));
        }
        Ok(product_chunks(&axes))
    }

    /// Destination keys overlapped by `region`.
    pub fn destination_keys(&self, region: &IndexRegion) -> Result<Vec<ChunkKey>> {
        Ok(self
            .destination_chunks(region)?
            .into_iter()
            .map(|c| c.key)
            .collect())
    }

    /// Slice `data`, covering `chunk`, into one piece per overlapped destination chunk.
    pub fn shuffle(&self, chunk: &Chunk, data: &ChunkData) -> Result<Vec<ChunkPiece>> {
        data.validate(&self.descriptor, &chunk.region)?;
        let destinations = self.destination_chunks(&chunk.region)?;
        let mut pieces = Vec::with_capacity(destinations.len());
        for dest in destinations {
            let Some(overlap) = chunk.region.intersect(&dest.region) else {
                continue;
            };
            let sliced = data.slice(&self.descriptor, &chunk.region, &overlap)?;
            let origin = dest.region.origin();
            pieces.push(ChunkPiece {
                key: dest.key,
                offset: overlap
                    .iter()
                    .map(|(d, r)| (d.to_string(), r.start - origin.get(d).copied().unwrap_or(0)))
                    .collect(),
                shape: overlap.extents(),
                data: sliced,
            });
        }
        debug!(key = %chunk.key, pieces = pieces.len(), "Shuffled chunk");
        Ok(pieces)
    }

    /// Number of pieces each destination key receives from `chunks`.
    pub fn expected_pieces<I>(&self, chunks: I) -> Result<BTreeMap<ChunkKey, usize>>
    where
        I: IntoIterator<Item = Chunk>,
    {
        let mut counts = BTreeMap::new();
        for chunk in chunks {
            for key in self.destination_keys(&chunk.region)? {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
