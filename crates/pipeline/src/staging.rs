//! Staging of shuffled pieces in an object store.
//!
//! ```text
//! <prefix>/<destination key>/<piece offset>   one object per piece
//! ```
//!
//! Both path segments are indices joined by `.` in dimension name order;
//! `0` stands for a dimensionless key. An object is a little-endian `u32`
//! header length, a JSON header, then the variable buffers in header order.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rechunk_core::{ChunkData, ChunkKey, ChunkPiece};
use rechunk_storage::{ObjectStore, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default staging prefix. Chunk variable names never start with `.`.
pub const DEFAULT_STAGING_PREFIX: &str = ".staging";

#[derive(Serialize, Deserialize)]
struct PieceHeader {
    key: ChunkKey,
    offset: BTreeMap<String, u64>,
    shape: BTreeMap<String, u64>,
    variables: Vec<(String, u64)>,
}

fn join_indices<'a>(indices: impl Iterator<Item = &'a u64>) -> String {
    let joined = indices.map(u64::to_string).collect::<Vec<_>>().join(".");
    if joined.is_empty() { "0".to_string() } else { joined }
}

/// Encode `piece` as one staging object.
pub fn encode_piece(piece: &ChunkPiece) -> StorageResult<Bytes> {
    let header = PieceHeader {
        key: piece.key.clone(),
        offset: piece.offset.clone(),
        shape: piece.shape.clone(),
        variables: piece
            .data
            .iter()
            .map(|(name, data)| (name.to_string(), data.len() as u64))
            .collect(),
    };
    let header = serde_json::to_vec(&header)?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| StorageError::Serialization("piece header too large".to_string()))?;

    let mut buf = BytesMut::with_capacity(4 + header.len() + piece.data.nbytes() as usize);
    buf.put_u32_le(header_len);
    buf.put_slice(&header);
    for (_, data) in piece.data.iter() {
        buf.put_slice(data);
    }
    Ok(buf.freeze())
}

/// Decode a staging object written by [`encode_piece`].
pub fn decode_piece(mut raw: Bytes) -> StorageResult<ChunkPiece> {
    let truncated = || StorageError::Serialization("truncated staged piece".to_string());
    if raw.remaining() < 4 {
        return Err(truncated());
    }
    let header_len = raw.get_u32_le() as usize;
    if raw.remaining() < header_len {
        return Err(truncated());
    }
    let header: PieceHeader = serde_json::from_slice(&raw.split_to(header_len))?;

    let mut data = ChunkData::new();
    for (name, len) in header.variables {
        let len = usize::try_from(len).map_err(|_| truncated())?;
        if raw.remaining() < len {
            return Err(truncated());
        }
        data.insert(name, raw.split_to(len));
    }
    if raw.has_remaining() {
        return Err(StorageError::Serialization(format!(
            "{} trailing bytes after staged piece",
            raw.remaining()
        )));
    }
    Ok(ChunkPiece {
        key: header.key,
        offset: header.offset,
        shape: header.shape,
        data,
    })
}

/// Pieces parked in an object store between the shuffle and consolidation
/// passes, so only one destination chunk's pieces are held at a time.
#[derive(Clone)]
pub struct PieceStaging {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl PieceStaging {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        Self { store, prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key_prefix(&self, key: &ChunkKey) -> String {
        format!("{}/{}/", self.prefix, join_indices(key.as_map().values()))
    }

    /// Object key of `piece`. Pieces of one destination chunk never share
    /// an offset.
    pub fn object_key(&self, piece: &ChunkPiece) -> String {
        format!(
            "{}{}",
            self.key_prefix(&piece.key),
            join_indices(piece.offset.values())
        )
    }

    #[instrument(skip(self, piece), fields(key = %piece.key, backend = self.store.backend_name()))]
    pub async fn put(&self, piece: &ChunkPiece) -> StorageResult<()> {
        self.store.put(&self.object_key(piece), encode_piece(piece)?).await
    }

    /// Every piece staged for the destination chunk `key`.
    pub async fn get(&self, key: &ChunkKey) -> StorageResult<Vec<ChunkPiece>> {
        let mut objects = self.store.list(&self.key_prefix(key)).await?;
        objects.sort();
        let mut pieces = Vec::with_capacity(objects.len());
        for object in &objects {
            let piece = decode_piece(self.store.get(object).await?)?;
            if &piece.key != key {
                return Err(StorageError::InvalidKey(format!(
                    "staged object {object} holds a piece for {}",
                    piece.key
                )));
            }
            pieces.push(piece);
        }
        Ok(pieces)
    }

    /// Delete the pieces staged for `key`.
    pub async fn remove(&self, key: &ChunkKey) -> StorageResult<usize> {
        self.delete_all(&self.key_prefix(key)).await
    }

    /// Delete everything under the staging prefix.
    pub async fn clear(&self) -> StorageResult<usize> {
        self.delete_all(&format!("{}/", self.prefix)).await
    }

    async fn delete_all(&self, prefix: &str) -> StorageResult<usize> {
        let objects = self.store.list(prefix).await?;
        for object in &objects {
            match self.store.delete(object).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if !objects.is_empty() {
            debug!(prefix, deleted = objects.len(), "Deleted staged pieces");
        }
        Ok(objects.len())
    }
}

impl std::fmt::Debug for PieceStaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PieceStaging")
            .field("backend", &self.store.backend_name())
            .field("prefix", &self.prefix)
            .finish()
    }
}
