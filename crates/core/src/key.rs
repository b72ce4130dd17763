//! Chunk keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Zero-based chunk index per dimension, relative to one chunk scheme.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkKey(BTreeMap<String, u64>);

impl ChunkKey {
    /// Create an empty key (the single chunk of a dimensionless dataset).
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Create a key from `(dimension, index)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self(pairs.into_iter().map(|(d, i)| (d.into(), i)).collect())
    }

    /// Return a copy of this key with `dim` set to `index`.
    pub fn with(mut self, dim: impl Into<String>, index: u64) -> Self {
        self.0.insert(dim.into(), index);
        self
    }

    /// Chunk index along `dim`.
    pub fn get(&self, dim: &str) -> Option<u64> {
        self.0.get(dim).copied()
    }

    /// Iterate over `(dimension, index)` pairs in dimension name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(d, i)| (d.as_str(), *i))
    }

    /// Number of dimensions in the key.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no dimensions.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Indices along `dims`, in that order. Dimensions absent from the key map to 0.
    pub fn indices_for(&self, dims: &[String]) -> Vec<u64> {
        dims.iter().map(|d| self.get(d).unwrap_or(0)).collect()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &BTreeMap<String, u64> {
        &self.0
    }
}

impl fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkKey({self})")
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (dim, index)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}: {index}")?;
        }
        f.write_str("}")
    }
}

impl From<BTreeMap<String, u64>> for ChunkKey {
    fn from(map: BTreeMap<String, u64>) -> Self {
        Self(map)
    }
}
