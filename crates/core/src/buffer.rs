//! Chunk data buffers.
//!
//! Each variable of a chunk is stored as one contiguous row-major byte buffer
//! over the variable's own dimensions, restricted to the chunk's index range.

use crate::chunk::IndexRegion;
use crate::dataset::DatasetDescriptor;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::BTreeMap;

/// Per-variable byte buffers for one chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkData {
    variables: BTreeMap<String, Bytes>,
}

impl ChunkData {
    /// Create an empty buffer set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable buffer.
    pub fn with_variable(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.variables.insert(name.into(), data.into());
        self
    }

    /// Insert or replace a variable buffer.
    pub fn insert(&mut self, name: impl Into<String>, data: Bytes) {
        self.variables.insert(name.into(), data);
    }

    /// Buffer for `name`.
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.variables.get(name)
    }

    /// Iterate over `(variable, buffer)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.variables.iter().map(|(n, b)| (n.as_str(), b))
    }

    /// Consume into the underlying map.
    pub fn into_variables(self) -> BTreeMap<String, Bytes> {
        self.variables
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns true if no variable is present.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Total bytes across all variables.
    pub fn nbytes(&self) -> u64 {
        self.variables.values().map(|b| b.len() as u64).sum()
    }

    /// Check that every dataset variable is present with the size implied by `region`.
    pub fn validate(&self, descriptor: &DatasetDescriptor, region: &IndexRegion) -> Result<()> {
        for name in self.variables.keys() {
            if !descriptor.variables.contains_key(name) {
                return Err(Error::Configuration(format!(
                    "buffer holds unknown variable {name}"
                )));
            }
        }
        for (name, var) in &descriptor.variables {
            let data = self
                .variables
                .get(name)
                .ok_or_else(|| Error::MissingVariable(name.clone()))?;
            let expected = var.nbytes(region);
            if data.len() as u64 != expected {
                return Err(Error::BufferSize {
                    variable: name.clone(),
                    expected,
                    actual: data.len() as u64,
                });
            }
        }
        Ok(())
    }

    /// Extract the sub-region `sub` of a chunk covering `region`.
    ///
    /// `sub` must lie within `region`; variables are sliced along their own
    /// dimensions only.
    pub fn slice(
        &self,
        descriptor: &DatasetDescriptor,
        region: &IndexRegion,
        sub: &IndexRegion,
    ) -> Result<ChunkData> {
        let mut out = ChunkData::new();
        for (name, data) in &self.variables {
            let var = descriptor
                .variables
                .get(name)
                .ok_or_else(|| Error::MissingVariable(name.clone()))?;
            if var.dims.iter().all(|d| region.range(d) == sub.range(d)) {
                // Nothing to cut along this variable's dimensions.
                out.insert(name.clone(), data.clone());
                continue;
            }
            let src_shape = var.shape(region);
            let block = var.shape(sub);
            let src_origin: Vec<u64> = var
                .dims
                .iter()
                .map(|d| {
                    let outer = region.range(d).map(|r| r.start).unwrap_or(0);
                    let inner = sub.range(d).map(|r| r.start).unwrap_or(outer);
                    inner - outer
                })
                .collect();
            let itemsize = var.itemsize as usize;
            let mut buf = vec![0u8; cell_count(&block) * itemsize];
            copy_block(
                data,
                &src_shape,
                &src_origin,
                &mut buf,
                &block,
                &vec![0; block.len()],
                &block,
                itemsize,
            );
            out.insert(name.clone(), Bytes::from(buf));
        }
        Ok(out)
    }
}

/// Number of cells in an N-d shape.
pub(crate) fn cell_count(shape: &[u64]) -> usize {
    shape.iter().product::<u64>() as usize
}

/// Row-major strides (in items) for `shape`.
pub(crate) fn row_major_strides(shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Copy an N-d block of `block` cells from `src` (shape `src_shape`, block at
/// `src_origin`) into `dst` (shape `dst_shape`, block at `dst_origin`).
///
/// Rows along the innermost dimension are copied as contiguous runs.
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_block(
    src: &[u8],
    src_shape: &[u64],
    src_origin: &[u64],
    dst: &mut [u8],
    dst_shape: &[u64],
    dst_origin: &[u64],
    block: &[u64],
    itemsize: usize,
) {
    let rank = block.len();
    if rank == 0 {
        dst[..itemsize].copy_from_slice(&src[..itemsize]);
        return;
    }
    if block.contains(&0) {
        return;
    }

    let src_strides = row_major_strides(src_shape);
    let dst_strides = row_major_strides(dst_shape);
    let inner = rank - 1;
    let run = block[inner] as usize * itemsize;

    let mut idx = vec![0u64; inner];
    loop {
        let mut src_off = src_origin[inner];
        let mut dst_off = dst_origin[inner];
        for d in 0..inner {
            src_off += (src_origin[d] + idx[d]) * src_strides[d];
            dst_off += (dst_origin[d] + idx[d]) * dst_strides[d];
        }
        let s = src_off as usize * itemsize;
        let t = dst_off as usize * itemsize;
        dst[t..t + run].copy_from_slice(&src[s..s + run]);

        // Advance over the outer dimensions, last fastest.
        let mut axis = inner;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < block[axis] {
                break;
            }
            idx[axis] = 0;
        }
    }
}
