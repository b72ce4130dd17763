use bytes::Bytes;
use rechunk_core::{Chunk, ChunkData, DatasetDescriptor, Variable};

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// A small dataset with a full-rank variable, a coordinate and a scalar.
pub fn sample_dataset() -> DatasetDescriptor {
    DatasetDescriptor::new([("time", 6), ("x", 5), ("y", 4)])
        .with_variable("temp", Variable::new(["time", "x", "y"], 4).with_dtype("float32"))
        .with_variable("x", Variable::new(["x"], 8).with_dtype("float64"))
        .with_variable("scale", Variable::new(Vec::<String>::new(), 2))
}

/// Deterministic contents for every variable of `chunk`.
///
/// Each item depends only on the seed, the variable and its global position,
/// so overlapping chunks of different layouts agree on their values.
pub fn fill_chunk(descriptor: &DatasetDescriptor, chunk: &Chunk, seed: u64) -> ChunkData {
    let mut data = ChunkData::new();
    for (v, (name, var)) in descriptor.variables.iter().enumerate() {
        let shape = var.shape(&chunk.region);
        let origin: Vec<u64> = var
            .dims
            .iter()
            .map(|d| chunk.region.range(d).map(|r| r.start).unwrap_or(0))
            .collect();
        let sizes: Vec<u64> = var
            .dims
            .iter()
            .map(|d| descriptor.dim_size(d).unwrap_or(1))
            .collect();
        let cells: u64 = shape.iter().product();
        let mut buf = Vec::with_capacity((cells * var.itemsize) as usize);
        let mut idx = vec![0u64; shape.len()];
        for _ in 0..cells {
            let mut flat = 0u64;
            for k in 0..shape.len() {
                flat = flat * sizes[k] + origin[k] + idx[k];
            }
            let mut state = seed ^ ((v as u64) << 48) ^ flat.wrapping_mul(0x9E37_79B9_7F4A_7C15);
            for _ in 0..var.itemsize {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                buf.push((state >> 33) as u8);
            }
            for k in (0..shape.len()).rev() {
                idx[k] += 1;
                if idx[k] < shape[k] {
                    break;
                }
                idx[k] = 0;
            }
        }
        data.insert(name.clone(), Bytes::from(buf));
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(42, 1000);
        assert_eq!(data1, data2);
    }

    #[test]
    fn test_seeded_bytes_different_seeds() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(43, 1000);
        assert_ne!(data1, data2);
    }

    #[test]
    fn test_fill_chunk_agrees_across_layouts() {
        let ds = sample_dataset();
        let whole = Chunk::new(rechunk_core::ChunkKey::new(), ds.full_region());
        let full = fill_chunk(&ds, &whole, 3);
        let sub = Chunk::new(
            rechunk_core::ChunkKey::new(),
            rechunk_core::IndexRegion::from_ranges([("time", 2..5), ("x", 1..3), ("y", 0..4)]),
        );
        assert_eq!(
            full.slice(&ds, &whole.region, &sub.region).unwrap(),
            fill_chunk(&ds, &sub, 3)
        );
    }
}
