//! Destination templates: storage metadata with no data payload.

use crate::dataset::{DatasetDescriptor, Variable};
use crate::indexer::ChunkIndexer;
use crate::scheme::ChunkScheme;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Layout of one variable in a chunked store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub dims: Vec<String>,
    pub itemsize: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    /// Full array shape, in `dims` order.
    pub shape: Vec<u64>,
    /// Chunk shape, in `dims` order.
    pub chunk_shape: Vec<u64>,
}

/// Dimensions, variables and chunk layout of a chunked store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub dims: BTreeMap<String, u64>,
    /// Resolved chunk length per dimension.
    pub chunks: BTreeMap<String, u64>,
    pub variables: BTreeMap<String, TemplateVariable>,
}

impl Template {
    /// Derive the template of `descriptor` stored with the chunk grid `layout`.
    pub fn derive(descriptor: &DatasetDescriptor, layout: &ChunkIndexer) -> Self {
        let chunks = layout.chunk_lengths();
        let variables = descriptor
            .variables
            .iter()
            .map(|(name, var)| {
                let shape = var
                    .dims
                    .iter()
                    .map(|d| descriptor.dim_size(d).unwrap_or(0))
                    .collect();
                let chunk_shape = var
                    .dims
                    .iter()
                    .map(|d| chunks.get(d).copied().unwrap_or(0))
                    .collect();
                (
                    name.clone(),
                    TemplateVariable {
                        dims: var.dims.clone(),
                        itemsize: var.itemsize,
                        dtype: var.dtype.clone(),
                        shape,
                        chunk_shape,
                    },
                )
            })
            .collect();
        Self {
            dims: descriptor.dims.clone(),
            chunks,
            variables,
        }
    }

    /// The dataset described by this template.
    pub fn descriptor(&self) -> DatasetDescriptor {
        DatasetDescriptor {
            dims: self.dims.clone(),
            variables: self
                .variables
                .iter()
                .map(|(name, v)| {
                    (
                        name.clone(),
                        Variable {
                            dims: v.dims.clone(),
                            itemsize: v.itemsize,
                            dtype: v.dtype.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// The chunk scheme of the store.
    pub fn chunk_scheme(&self) -> ChunkScheme {
        ChunkScheme::from(self.chunks.clone())
    }

    /// The chunk grid of the store.
    pub fn indexer(&self) -> ChunkIndexer {
        ChunkIndexer::from_lengths(&self.descriptor(), &self.chunks)
    }

    /// Total bytes of every variable.
    pub fn nbytes(&self) -> u64 {
        self.variables
            .values()
            .map(|v| v.shape.iter().product::<u64>() * v.itemsize)
            .sum()
    }
}

/// Derive the destination template for `descriptor` under `target`.
pub fn derive_template(descriptor: &DatasetDescriptor, target: &ChunkIndexer) -> Template {
    Template::derive(descriptor, target)
}
