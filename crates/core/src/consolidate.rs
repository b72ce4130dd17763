//! Assembling destination chunks from their pieces.

use crate::buffer::{ChunkData, cell_count, copy_block};
use crate::chunk::IndexRegion;
use crate::dataset::DatasetDescriptor;
use crate::error::{Error, Result};
use crate::indexer::ChunkIndexer;
use crate::key::ChunkKey;
use crate::shuffle::ChunkPiece;
use bytes::Bytes;
use tracing::debug;

/// Assembles the pieces received for a destination key into one chunk.
#[derive(Clone, Debug)]
pub struct Consolidator {
    descriptor: DatasetDescriptor,
    target: ChunkIndexer,
}

impl Consolidator {
    /// Create a consolidator for the destination grid `target`.
    pub fn new(descriptor: DatasetDescriptor, target: ChunkIndexer) -> Self {
        Self { descriptor, target }
    }

    /// Assemble `pieces` into the destination chunk `key`.
    ///
    /// The pieces must tile the chunk exactly, both over the full dataset
    /// dimensions and over each variable's own dimensions. Copies of a
    /// variable that lacks some dimension must be identical. Order is
    /// irrelevant.
    pub fn consolidate(&self, key: &ChunkKey, pieces: &[ChunkPiece]) -> Result<ChunkData> {
        let dest = self.target.chunk(key)?;
        let bounds = dest.region.relative_to(&dest.region.origin());

        let mut regions = Vec::with_capacity(pieces.len());
        for piece in pieces {
            if &piece.key != key {
                return Err(Error::InvalidKey(format!(
                    "piece for {} delivered to {key}",
                    piece.key
                )));
            }
            let region = piece.relative_region();
            if region.is_empty() || !bounds.contains(&region) {
                return Err(Error::OverlapConsolidation {
                    key: key.clone(),
                    variable: None,
                    detail: format!("piece {region:?} extends beyond chunk bounds {bounds:?}"),
                });
            }
            if let Some((name, _)) = piece
                .data
                .iter()
                .find(|(name, _)| !self.descriptor.variables.contains_key(*name))
            {
                return Err(Error::Configuration(format!(
                    "piece for {key} holds unknown variable {name}"
                )));
            }
            regions.push(region);
        }
        check_tiling(key, None, &bounds, &regions)?;

        let mut out = ChunkData::new();
        for (name, var) in &self.descriptor.variables {
            let projected = bounds.project(&var.dims);
            // Pieces that differ only along dimensions the variable lacks
            // carry the same sub-range and must agree byte for byte.
            let mut covering: Vec<(IndexRegion, &IndexRegion, &Bytes)> = Vec::new();
            for (piece, region) in pieces.iter().zip(&regions) {
                let Some(data) = piece.data.get(name) else {
                    continue;
                };
                let expected = var.nbytes(region);
                if data.len() as u64 != expected {
                    return Err(Error::BufferSize {
                        variable: name.clone(),
                        expected,
                        actual: data.len() as u64,
                    });
                }
                let projection = region.project(&var.dims);
                match covering.iter().position(|(p, _, _)| *p == projection) {
                    Some(i) if covering[i].2 != data => {
                        return Err(Error::OverlapConsolidation {
                            key: key.clone(),
                            variable: Some(name.clone()),
                            detail: format!("conflicting copies over {projection:?}"),
                        });
                    }
                    Some(_) => {}
                    None => covering.push((projection, region, data)),
                }
            }
            let projections: Vec<_> = covering.iter().map(|(p, _, _)| p.clone()).collect();
            check_tiling(key, Some(name), &projected, &projections)?;

            let dst_shape = var.shape(&dest.region);
            let itemsize = var.itemsize as usize;
            let mut buf = vec![0u8; cell_count(&dst_shape) * itemsize];
            for (_, region, data) in covering {
                let block = var.shape(region);
                let dst_origin: Vec<u64> = var
                    .dims
                    .iter()
                    .map(|d| region.range(d).map(|r| r.start).unwrap_or(0))
                    .collect();
                copy_block(
                    data,
                    &block,
                    &vec![0; block.len()],
                    &mut buf,
                    &dst_shape,
                    &dst_origin,
                    &block,
                    itemsize,
                );
            }
            out.insert(name.clone(), Bytes::from(buf));
        }
        debug!(key = %key, pieces = pieces.len(), bytes = out.nbytes(), "Consolidated chunk");
        Ok(out)
    }
}

/// Check that `regions` tile `bounds` with neither overlap nor gap.
fn check_tiling(
    key: &ChunkKey,
    variable: Option<&String>,
    bounds: &IndexRegion,
    regions: &[IndexRegion],
) -> Result<()> {
    let first_dim = bounds.dims().next().map(str::to_string);
    let start = |r: &IndexRegion| {
        first_dim
            .as_deref()
            .and_then(|d| r.range(d))
            .map(|r| (r.start, r.end))
            .unwrap_or((0, 1))
    };
    let mut sorted: Vec<&IndexRegion> = regions.iter().collect();
    sorted.sort_by_key(|r| start(r).0);

    // Sweep along the first dimension; only regions starting before the
    // current one ends can overlap it.
    for (i, a) in sorted.iter().enumerate() {
        let a_end = start(a).1;
        for b in &sorted[i + 1..] {
            if start(b).0 >= a_end {
                break;
            }
            if a.overlaps(b) {
                return Err(Error::OverlapConsolidation {
                    key: key.clone(),
                    variable: variable.cloned(),
                    detail: format!("{a:?} overlaps {b:?}"),
                });
            }
        }
    }

    let covered: u64 = regions.iter().map(IndexRegion::num_cells).sum();
    let expected = bounds.num_cells();
    if covered < expected {
        return Err(Error::IncompleteConsolidation {
            key: key.clone(),
            variable: variable.cloned(),
            covered,
            expected,
        });
    }
    Ok(())
}
