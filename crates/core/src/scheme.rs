//! Chunk schemes and their normalization against a dataset.

use crate::dataset::DatasetDescriptor;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Chunk length sentinel meaning "the entire dimension in one chunk".
pub const FULL_DIMENSION: i64 = -1;

/// Chunk specification for one dimension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkSpec {
    /// A single chunk length, or [`FULL_DIMENSION`].
    Length(i64),
    /// Explicit chunk sizes. All but the last must be equal, and the last may
    /// not be larger than the others.
    Explicit(Vec<u64>),
}

impl From<i64> for ChunkSpec {
    fn from(len: i64) -> Self {
        Self::Length(len)
    }
}

impl ChunkSpec {
    /// Resolve to a concrete chunk length for a dimension of `size`.
    pub fn resolve(&self, dim: &str, size: u64) -> Result<u64> {
        match self {
            ChunkSpec::Length(FULL_DIMENSION) => Ok(size),
            ChunkSpec::Length(len) if *len <= 0 => Err(Error::ChunkSize {
                dim: dim.to_string(),
                reason: format!("chunk length must be positive or {FULL_DIMENSION}, got {len}"),
            }),
            ChunkSpec::Length(len) => Ok((*len as u64).min(size)),
            ChunkSpec::Explicit(sizes) => resolve_explicit(dim, sizes, size),
        }
    }
}

fn resolve_explicit(dim: &str, sizes: &[u64], size: u64) -> Result<u64> {
    let not_constant = || Error::ChunkSize {
        dim: dim.to_string(),
        reason: format!("chunks for dimension {dim} are not constant: {sizes:?}"),
    };
    let (&first, rest) = sizes.split_first().ok_or_else(|| Error::ChunkSize {
        dim: dim.to_string(),
        reason: "explicit chunk list is empty".to_string(),
    })?;
    if first == 0 {
        return Err(Error::ChunkSize {
            dim: dim.to_string(),
            reason: "chunk length must be positive, got 0".to_string(),
        });
    }
    if let Some((&last, middle)) = rest.split_last() {
        if middle.iter().any(|&s| s != first) || last == 0 || last > first {
            return Err(not_constant());
        }
    }
    let total: u64 = sizes.iter().sum();
    if total != size {
        return Err(Error::ChunkSize {
            dim: dim.to_string(),
            reason: format!("explicit chunks sum to {total}, dimension size is {size}"),
        });
    }
    Ok(first)
}

/// Chunk specification per dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkScheme(BTreeMap<String, ChunkSpec>);

impl ChunkScheme {
    /// Create an empty scheme.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Create a scheme from `(dimension, length)` pairs.
    pub fn from_lengths<I, S>(lengths: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self(
            lengths
                .into_iter()
                .map(|(d, l)| (d.into(), ChunkSpec::Length(l)))
                .collect(),
        )
    }

    /// Return a copy of this scheme with `dim` set to `spec`.
    pub fn with(mut self, dim: impl Into<String>, spec: impl Into<ChunkSpec>) -> Self {
        self.0.insert(dim.into(), spec.into());
        self
    }

    /// Specification for `dim`.
    pub fn get(&self, dim: &str) -> Option<&ChunkSpec> {
        self.0.get(dim)
    }

    /// Iterate over `(dimension, spec)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChunkSpec)> {
        self.0.iter().map(|(d, s)| (d.as_str(), s))
    }

    /// Resolve every dimension of `descriptor` to a concrete chunk length.
    ///
    /// Dimensions of the dataset not used by any variable and absent from the
    /// scheme resolve to a single chunk.
    pub fn resolve(&self, descriptor: &DatasetDescriptor) -> Result<BTreeMap<String, u64>> {
        for dim in self.0.keys() {
            if !descriptor.dims.contains_key(dim) {
                return Err(Error::ChunkSize {
                    dim: dim.clone(),
                    reason: format!("invalid chunk key: {dim} is not a dataset dimension"),
                });
            }
        }
        let used = descriptor.used_dims();
        let mut lengths = BTreeMap::new();
        for (dim, &size) in &descriptor.dims {
            let len = match self.0.get(dim) {
                Some(spec) => spec.resolve(dim, size)?,
                None if used.contains(dim.as_str()) => {
                    return Err(Error::Configuration(format!(
                        "chunk scheme does not cover dimension {dim}"
                    )));
                }
                None => size,
            };
            lengths.insert(dim.clone(), len);
        }
        Ok(lengths)
    }
}

impl From<BTreeMap<String, u64>> for ChunkScheme {
    fn from(lengths: BTreeMap<String, u64>) -> Self {
        Self(
            lengths
                .into_iter()
                .map(|(d, l)| (d, ChunkSpec::Length(l as i64)))
                .collect(),
        )
    }
}
