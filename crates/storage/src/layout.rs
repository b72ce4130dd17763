//! Object key layout of a chunked store.
//!
//! ```text
//! template.json          dataset dimensions, variables and chunk lengths
//! <variable>/<i>.<j>...  one object per variable chunk, indices in the
//!                        variable's dimension order
//! <variable>/0           the single chunk of a scalar variable
//! ```

use crate::error::{StorageError, StorageResult};
use rechunk_core::ChunkKey;

/// Key of the template object.
pub const TEMPLATE_KEY: &str = "template.json";

/// Object key of one variable chunk.
pub fn chunk_object_key(variable: &str, dims: &[String], key: &ChunkKey) -> StorageResult<String> {
    if variable.is_empty()
        || variable.contains('/')
        || variable.starts_with('.')
        || variable == TEMPLATE_KEY
    {
        return Err(StorageError::InvalidKey(format!(
            "invalid variable name: {variable:?}"
        )));
    }
    if dims.is_empty() {
        return Ok(format!("{variable}/0"));
    }
    let mut indices = Vec::with_capacity(dims.len());
    for dim in dims {
        let index = key.get(dim).ok_or_else(|| {
            StorageError::InvalidKey(format!(
                "chunk key {key} is missing dimension {dim} of variable {variable}"
            ))
        })?;
        indices.push(index.to_string());
    }
    Ok(format!("{variable}/{}", indices.join(".")))
}
