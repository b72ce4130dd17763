use bytes::Bytes;
use rechunk_core::{
    Chunk, ChunkData, ChunkIndexer, ChunkScheme, Consolidator, DatasetDescriptor, ShuffleGrouper,
    Template, Variable,
};
use rechunk_storage::{ChunkSink, ChunkSource, ChunkStore, ObjectStore};
use std::collections::BTreeMap;

/// A small dataset with a full-rank variable, a coordinate and a scalar.
#[allow(dead_code)]
pub fn sample_dataset() -> DatasetDescriptor {
    DatasetDescriptor::new([("time", 6), ("x", 5), ("y", 4)])
        .with_variable("temp", Variable::new(["time", "x", "y"], 4).with_dtype("float32"))
        .with_variable("x", Variable::new(["x"], 8).with_dtype("float64"))
        .with_variable("scale", Variable::new(Vec::<String>::new(), 2))
}

/// A reanalysis-shaped dataset: one float32 variable over time and a square grid.
#[allow(dead_code)]
pub fn era5(time: u64, side: u64) -> DatasetDescriptor {
    DatasetDescriptor::new([("time", time), ("latitude", side), ("longitude", side)]).with_variable(
        "t2m",
        Variable::new(["time", "latitude", "longitude"], 4).with_dtype("float32"),
    )
}

/// Deterministic contents for every variable of `chunk`.
///
/// Each item depends only on the seed, the variable and its global position,
/// so chunks of different layouts agree where they overlap.
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

/// Write `descriptor` into `store` chunked as `scheme`.
pub async fn write_dataset(
    store: &ChunkStore,
    descriptor: &DatasetDescriptor,
    scheme: &ChunkScheme,
    seed: u64,
) -> ChunkIndexer {
    let layout = ChunkIndexer::new(descriptor, scheme).unwrap();
    store
        .write_template(&Template::derive(descriptor, &layout))
        .await
        .unwrap();
    for chunk in layout.chunks() {
        let data = fill_chunk(descriptor, &chunk, seed);
        store.write_chunk_data(&chunk.key, &data).await.unwrap();
    }
    layout
}

/// Read a whole store back as a single chunk covering the dataset.
pub async fn read_full(store: &ChunkStore) -> ChunkData {
    let template = store.read_template().await.unwrap();
    let descriptor = template.descriptor();
    let whole = ChunkIndexer::from_lengths(&descriptor, &descriptor.dims);
    let grouper = ShuffleGrouper::new(descriptor.clone(), whole.clone());

    let mut pieces = Vec::new();
    for chunk in template.indexer().chunks() {
        let data = store.read_chunk_data(&descriptor, &chunk.key).await.unwrap();
        pieces.extend(grouper.shuffle(&chunk, &data).unwrap());
    }
    let key = whole.keys().next().unwrap();
    Consolidator::new(descriptor, whole)
        .consolidate(&key, &pieces)
        .unwrap()
}

/// Every object of a backend, by key.
#[allow(dead_code)]
pub async fn snapshot(backend: &dyn ObjectStore) -> BTreeMap<String, Bytes> {
    let mut objects = BTreeMap::new();
    for key in backend.list("").await.unwrap() {
        let data = backend.get(&key).await.unwrap();
        objects.insert(key, data);
    }
    objects
}
