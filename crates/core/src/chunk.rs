//! Chunk regions.

use crate::key::ChunkKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// A half-open index range per dimension.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexRegion(BTreeMap<String, Range<u64>>);

impl IndexRegion {
    /// Create an empty (dimensionless) region.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Create a region from `(dimension, range)` pairs.
    pub fn from_ranges<I, S>(ranges: I) -> Self
    where
        I: IntoIterator<Item = (S, Range<u64>)>,
        S: Into<String>,
    {
        Self(ranges.into_iter().map(|(d, r)| (d.into(), r)).collect())
    }

    /// Return a copy of this region with `dim` set to `range`.
    pub fn with(mut self, dim: impl Into<String>, range: Range<u64>) -> Self {
        self.0.insert(dim.into(), range);
        self
    }

    /// Range along `dim`.
    pub fn range(&self, dim: &str) -> Option<&Range<u64>> {
        self.0.get(dim)
    }

    /// Iterate over `(dimension, range)` pairs in dimension name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Range<u64>)> {
        self.0.iter().map(|(d, r)| (d.as_str(), r))
    }

    /// Dimension names in order.
    pub fn dims(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of indices along `dim` (0 for unknown dimensions).
    pub fn extent(&self, dim: &str) -> u64 {
        self.0.get(dim).map(|r| r.end - r.start).unwrap_or(0)
    }

    /// Extents per dimension.
    pub fn extents(&self) -> BTreeMap<String, u64> {
        self.0
            .iter()
            .map(|(d, r)| (d.clone(), r.end - r.start))
            .collect()
    }

    /// Start index per dimension.
    pub fn origin(&self) -> BTreeMap<String, u64> {
        self.0.iter().map(|(d, r)| (d.clone(), r.start)).collect()
    }

    /// Total number of cells.
    pub fn num_cells(&self) -> u64 {
        self.0.values().map(|r| r.end - r.start).product()
    }

    /// Returns true if any dimension has an empty range.
    pub fn is_empty(&self) -> bool {
        self.0.values().any(|r| r.start >= r.end)
    }

    /// Returns true if `other` lies entirely within this region.
    ///
    /// Both regions must share the same dimensions.
    pub fn contains(&self, other: &IndexRegion) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().all(|(d, r)| {
                other
                    .0
                    .get(d)
                    .is_some_and(|o| o.start >= r.start && o.end <= r.end)
            })
    }

    /// Intersection over the dimensions of `self`.
    ///
    /// Dimensions missing from `other` are kept unchanged. Returns `None`
    /// when the intersection is empty.
    pub fn intersect(&self, other: &IndexRegion) -> Option<IndexRegion> {
        let mut out = BTreeMap::new();
        for (dim, r) in &self.0 {
            let range = match other.0.get(dim) {
                Some(o) => r.start.max(o.start)..r.end.min(o.end),
                None => r.clone(),
            };
            if range.start >= range.end {
                return None;
            }
            out.insert(dim.clone(), range);
        }
        Some(IndexRegion(out))
    }

    /// Restrict to the given dimensions, in region order.
    pub fn project(&self, dims: &[String]) -> IndexRegion {
        IndexRegion(
            self.0
                .iter()
                .filter(|(d, _)| dims.contains(d))
                .map(|(d, r)| (d.clone(), r.clone()))
                .collect(),
        )
    }

    /// Express this region relative to `origin` (subtracting its start per dimension).
    pub fn relative_to(&self, origin: &BTreeMap<String, u64>) -> IndexRegion {
        IndexRegion(
            self.0
                .iter()
                .map(|(d, r)| {
                    let base = origin.get(d).copied().unwrap_or(0);
                    (d.clone(), (r.start - base)..(r.end - base))
                })
                .collect(),
        )
    }

    /// Returns true if the two regions share at least one cell.
    pub fn overlaps(&self, other: &IndexRegion) -> bool {
        self.0.iter().all(|(d, r)| match other.0.get(d) {
            Some(o) => r.start < o.end && o.start < r.end,
            None => true,
        })
    }
}

impl fmt::Debug for IndexRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (dim, r)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}: {}..{}", r.start, r.end)?;
        }
        f.write_str("}")
    }
}

/// A chunk: its key under a scheme and the index range it covers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk key.
    pub key: ChunkKey,
    /// The covered index range per dimension.
    pub region: IndexRegion,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(key: ChunkKey, region: IndexRegion) -> Self {
        Self { key, region }
    }

    /// Total number of cells in the chunk.
    pub fn num_cells(&self) -> u64 {
        self.region.num_cells()
    }
}

/// Candidate `(index, range)` pairs along one dimension.
pub(crate) type AxisChunks = (String, Vec<(u64, Range<u64>)>);

/// Cartesian product of per-dimension chunk candidates, row-major with the
/// last axis varying fastest.
pub(crate) fn product_chunks(axes: &[AxisChunks]) -> Vec<Chunk> {
    fn walk(
        axes: &[AxisChunks],
        axis: usize,
        key: &mut Vec<(String, u64)>,
        region: &mut Vec<(String, Range<u64>)>,
        out: &mut Vec<Chunk>,
    ) {
        if axis == axes.len() {
            out.push(Chunk::new(
                ChunkKey::from_pairs(key.iter().cloned()),
                IndexRegion::from_ranges(region.iter().cloned()),
            ));
            return;
        }
        let (dim, candidates) = &axes[axis];
        for (index, range) in candidates {
            key.push((dim.clone(), *index));
            region.push((dim.clone(), range.clone()));
            walk(axes, axis + 1, key, region, out);
            key.pop();
            region.pop();
        }
    }

    let capacity = axes.iter().map(|(_, c)| c.len()).product();
    let mut out = Vec::with_capacity(capacity);
    walk(
        axes,
        0,
        &mut Vec::with_capacity(axes.len()),
        &mut Vec::with_capacity(axes.len()),
        &mut out,
    );
    out
}
