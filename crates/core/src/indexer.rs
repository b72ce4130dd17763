//! Chunk indexing: mapping between chunk keys and index ranges.

use crate::chunk::{Chunk, IndexRegion};
use crate::dataset::DatasetDescriptor;
use crate::error::{Error, Result};
use crate::key::ChunkKey;
use crate::scheme::ChunkScheme;
use std::collections::BTreeMap;

/// Size and chunk length of one dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DimGrid {
    /// Dimension size.
    pub size: u64,
    /// Resolved chunk length (always positive).
    pub chunk_len: u64,
}

impl DimGrid {
    /// Number of chunks along this dimension.
    pub fn num_chunks(&self) -> u64 {
        self.size.div_ceil(self.chunk_len)
    }

    /// Index range covered by chunk `index`.
    pub fn chunk_range(&self, index: u64) -> std::ops::Range<u64> {
        let start = index.saturating_mul(self.chunk_len).min(self.size);
        start..start.saturating_add(self.chunk_len).min(self.size)
    }
}

/// Chunk grid of a dataset under one resolved chunk scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkIndexer {
    dims: BTreeMap<String, DimGrid>,
}

impl ChunkIndexer {
    /// Resolve `scheme` against `descriptor`.
    pub fn new(descriptor: &DatasetDescriptor, scheme: &ChunkScheme) -> Result<Self> {
        let lengths = scheme.resolve(descriptor)?;
        Ok(Self::from_lengths(descriptor, &lengths))
    }

    /// Build from already-resolved chunk lengths. Missing dimensions are
    /// single chunks; zero lengths are treated as the full dimension.
    pub fn from_lengths(descriptor: &DatasetDescriptor, lengths: &BTreeMap<String, u64>) -> Self {
        let dims = descriptor
            .dims
            .iter()
            .map(|(dim, &size)| {
                let chunk_len = match lengths.get(dim) {
                    Some(&len) if len > 0 => len.min(size),
                    _ => size,
                };
                (
                    dim.clone(),
                    DimGrid {
                        size,
                        chunk_len: chunk_len.max(1),
                    },
                )
            })
            .collect();
        Self { dims }
    }

    /// Per-dimension grids.
    pub fn dims(&self) -> &BTreeMap<String, DimGrid> {
        &self.dims
    }

    /// Resolved chunk length along `dim`.
    pub fn chunk_len(&self, dim: &str) -> Option<u64> {
        self.dims.get(dim).map(|g| g.chunk_len)
    }

    /// Size of `dim`.
    pub fn dim_size(&self, dim: &str) -> Option<u64> {
        self.dims.get(dim).map(|g| g.size)
    }

    /// Resolved chunk lengths per dimension.
    pub fn chunk_lengths(&self) -> BTreeMap<String, u64> {
        self.dims
            .iter()
            .map(|(d, g)| (d.clone(), g.chunk_len))
            .collect()
    }

    /// Number of chunks per dimension.
    pub fn grid_shape(&self) -> BTreeMap<String, u64> {
        self.dims
            .iter()
            .map(|(d, g)| (d.clone(), g.num_chunks()))
            .collect()
    }

    /// Total number of chunks.
    pub fn num_chunks(&self) -> u64 {
        self.dims.values().map(DimGrid::num_chunks).product()
    }

    /// Extents of the largest chunk (the first one along every dimension).
    pub fn max_chunk_extents(&self) -> BTreeMap<String, u64> {
        self.chunk_lengths()
    }

    /// Enumerate every chunk key, row-major over dimension names.
    pub fn keys(&self) -> KeyIter<'_> {
        KeyIter::new(self)
    }

    /// Enumerate every chunk with its region.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        self.keys().map(|key| {
            let region = self.region_unchecked(&key);
            Chunk::new(key, region)
        })
    }

    /// The chunk addressed by `key`.
    pub fn chunk(&self, key: &ChunkKey) -> Result<Chunk> {
        if key.len() != self.dims.len() {
            return Err(Error::InvalidKey(format!(
                "{key} has {} dimensions, expected {}",
                key.len(),
                self.dims.len()
            )));
        }
        for (dim, grid) in &self.dims {
            let index = key.get(dim).ok_or_else(|| {
                Error::InvalidKey(format!("{key} is missing dimension {dim}"))
            })?;
            if index >= grid.num_chunks() {
                return Err(Error::InvalidKey(format!(
                    "{key}: index {index} out of range for dimension {dim} ({} chunks)",
                    grid.num_chunks()
                )));
            }
        }
        Ok(Chunk::new(key.clone(), self.region_unchecked(key)))
    }

    /// The key of the chunk containing `position`.
    pub fn key_for_position(&self, position: &BTreeMap<String, u64>) -> Result<ChunkKey> {
        let mut key = ChunkKey::new();
        for (dim, grid) in &self.dims {
            let index = position.get(dim).copied().ok_or_else(|| {
                Error::InvalidKey(format!("position is missing dimension {dim}"))
            })?;
            if index >= grid.size {
                return Err(Error::InvalidKey(format!(
                    "position {index} out of bounds for dimension {dim} of size {}",
                    grid.size
                )));
            }
            key = key.with(dim.clone(), index / grid.chunk_len);
        }
        Ok(key)
    }

    fn region_unchecked(&self, key: &ChunkKey) -> IndexRegion {
        IndexRegion::from_ranges(self.dims.iter().map(|(dim, grid)| {
            let index = key.get(dim).unwrap_or(0);
            (dim.clone(), grid.chunk_range(index))
        }))
    }
}

/// Iterator over all keys of a [`ChunkIndexer`].
pub struct KeyIter<'a> {
    dims: Vec<(&'a str, u64)>,
    current: Option<Vec<u64>>,
    remaining: u64,
}

impl<'a> KeyIter<'a> {
    fn new(indexer: &'a ChunkIndexer) -> Self {
        let dims: Vec<_> = indexer
            .dims
            .iter()
            .map(|(d, g)| (d.as_str(), g.num_chunks()))
            .collect();
        let remaining = indexer.num_chunks();
        let current = (remaining > 0).then(|| vec![0; dims.len()]);
        Self {
            dims,
            current,
            remaining,
        }
    }
}

impl Iterator for KeyIter<'_> {
    type Item = ChunkKey;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.as_mut()?;
        let key = ChunkKey::from_pairs(self.dims.iter().zip(current.iter()).map(|((d, _), &i)| (*d, i)));
        self.remaining -= 1;

        // Advance the odometer, last dimension fastest.
        let mut exhausted = true;
        for axis in (0..current.len()).rev() {
            current[axis] += 1;
            if current[axis] < self.dims[axis].1 {
                exhausted = false;
                break;
            }
            current[axis] = 0;
        }
        if exhausted {
            self.current = None;
        }
        Some(key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (len, Some(len))
    }
}
