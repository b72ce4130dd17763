// End-to-end rechunk runs through chunk stores
// Checks that data survives any change of chunk layout byte for byte

mod common;

use common::{CountingBackend, era5, fill_chunk, read_full, sample_dataset, snapshot, write_dataset};
use rechunk_core::{
    Chunk, ChunkKey, ChunkScheme, DatasetDescriptor, Error, RechunkConfig, RechunkPlanner, Variable,
};
use rechunk_pipeline::{
    DEFAULT_STAGING_PREFIX, LocalExecutor, PieceStaging, PipelineError, RechunkReport, Rechunker,
    rechunk,
};
use rechunk_storage::{ChunkSource, ChunkStore, FilesystemBackend, MemoryBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;

struct Stores {
    input_backend: Arc<MemoryBackend>,
    input: Arc<ChunkStore>,
    output_backend: Arc<MemoryBackend>,
    output: Arc<ChunkStore>,
}

fn memory_stores() -> Stores {
    let input_backend = Arc::new(MemoryBackend::new());
    let output_backend = Arc::new(MemoryBackend::new());
    Stores {
        input: Arc::new(ChunkStore::new(input_backend.clone())),
        input_backend,
        output: Arc::new(ChunkStore::new(output_backend.clone())),
        output_backend,
    }
}

fn full_chunk(ds: &DatasetDescriptor) -> Chunk {
    Chunk::new(ChunkKey::new(), ds.full_region())
}

async fn run(config: RechunkConfig, stores: &Stores) -> RechunkReport {
    rechunk(
        config,
        stores.input.clone(),
        stores.output.clone(),
        &LocalExecutor::new(4),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_identity_rechunk_reproduces_source_objects() {
    let ds = sample_dataset();
    let scheme = ChunkScheme::from_lengths([("time", 2), ("x", 3), ("y", -1)]);
    let stores = memory_stores();
    write_dataset(&stores.input, &ds, &scheme, 11).await;

    let report = run(RechunkConfig::new(ds.clone(), scheme.clone(), scheme), &stores).await;
    assert_eq!(report.source_chunks, 6);
    assert_eq!(report.destination_chunks, 6);
    assert_eq!(report.pieces, 6);

    assert_eq!(
        snapshot(stores.output_backend.as_ref()).await,
        snapshot(stores.input_backend.as_ref()).await
    );
}

#[tokio::test]
async fn test_full_dimension_and_explicit_length_are_equivalent() {
    let ds = sample_dataset();
    let source = ChunkScheme::from_lengths([("time", 1), ("x", -1), ("y", -1)]);

    let mut outputs = Vec::new();
    for time in [-1, 6] {
        let stores = memory_stores();
        write_dataset(&stores.input, &ds, &source, 5).await;
        let target = ChunkScheme::from_lengths([("time", time), ("x", 2), ("y", 2)]);
        run(RechunkConfig::new(ds.clone(), source.clone(), target), &stores).await;
        outputs.push(snapshot(stores.output_backend.as_ref()).await);
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn test_round_trip_restores_source_layout() {
    let ds = sample_dataset();
    let a = ChunkScheme::from_lengths([("time", 4), ("x", -1), ("y", 3)]);
    let b = ChunkScheme::from_lengths([("time", -1), ("x", 2), ("y", 1)]);

    let forward = memory_stores();
    write_dataset(&forward.input, &ds, &a, 21).await;
    run(RechunkConfig::new(ds.clone(), a.clone(), b.clone()), &forward).await;

    // Feed the intermediate store back through the reverse job.
    let back_backend = Arc::new(MemoryBackend::new());
    let back = Stores {
        input_backend: forward.output_backend.clone(),
        input: Arc::new(ChunkStore::new(forward.output_backend.clone())),
        output: Arc::new(ChunkStore::new(back_backend.clone())),
        output_backend: back_backend,
    };
    run(RechunkConfig::new(ds, b, a), &back).await;

    assert_eq!(
        snapshot(back.output_backend.as_ref()).await,
        snapshot(forward.input_backend.as_ref()).await
    );
}

#[tokio::test]
async fn test_total_bytes_are_conserved() {
    let ds = DatasetDescriptor::new([("time", 9), ("x", 7)])
        .with_variable("a", Variable::new(["time", "x"], 4))
        .with_variable("b", Variable::new(["x", "time"], 2));
    let source = ChunkScheme::from_lengths([("time", 2), ("x", -1)]);
    let target = ChunkScheme::from_lengths([("time", -1), ("x", 3)]);
    let stores = memory_stores();
    write_dataset(&stores.input, &ds, &source, 1).await;

    let report = run(RechunkConfig::new(ds.clone(), source, target), &stores).await;
    let total = ds.nbytes(&ds.full_region());
    assert_eq!(report.bytes_read, total);
    assert_eq!(report.bytes_written, total);
    assert_eq!(read_full(&stores.output).await, fill_chunk(&ds, &full_chunk(&ds), 1));
}

#[tokio::test]
async fn test_time_chunks_to_spatial_tiles() {
    let ds = era5(62, 16);
    let source = ChunkScheme::from_lengths([("time", 31), ("latitude", -1), ("longitude", -1)]);
    let target = ChunkScheme::from_lengths([("time", -1), ("latitude", 5), ("longitude", 5)]);
    let stores = memory_stores();
    write_dataset(&stores.input, &ds, &source, 62).await;

    let report = run(RechunkConfig::new(ds.clone(), source, target), &stores).await;
    assert_eq!(report.source_chunks, 2);
    assert_eq!(report.destination_chunks, 16);
    // Every spatial tile hears from both halves of the time axis.
    assert_eq!(report.pieces, 32);

    let template = stores.output.read_template().await.unwrap();
    assert_eq!(template.variables["t2m"].chunk_shape, vec![62, 5, 5]);
    assert_eq!(read_full(&stores.output).await, fill_chunk(&ds, &full_chunk(&ds), 62));
}

#[tokio::test]
async fn test_target_missing_dimension_fails_before_reading() {
    let ds = era5(62, 16);
    let source = ChunkScheme::from_lengths([("time", 31), ("latitude", -1), ("longitude", -1)]);
    let input = CountingBackend::new();
    let input_store = Arc::new(ChunkStore::new(input.clone()));
    write_dataset(&input_store, &ds, &source, 3).await;
    let gets_before = input.gets();

    let output = CountingBackend::new();
    let target = ChunkScheme::from_lengths([("time", -1), ("latitude", 5)]);
    let err = rechunk(
        RechunkConfig::new(ds, source, target),
        input_store,
        Arc::new(ChunkStore::new(output.clone())),
        &LocalExecutor::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Rechunk(Error::Configuration(ref msg)) if msg.contains("target_chunks")
    ));
    assert_eq!(input.gets(), gets_before);
    assert_eq!(output.puts(), 0);
}

#[tokio::test]
async fn test_uneven_rows_to_columns() {
    let ds = DatasetDescriptor::new([("x", 100), ("y", 100)])
        .with_variable("foo", Variable::new(["x", "y"], 8));
    let source = ChunkScheme::from_lengths([("x", 12), ("y", -1)]);
    let target = ChunkScheme::from_lengths([("x", -1), ("y", 15)]);
    let stores = memory_stores();
    write_dataset(&stores.input, &ds, &source, 100).await;

    let config = RechunkConfig::new(ds.clone(), source, target).with_max_mem(8 * 100 * 100 / 2);
    let report = run(config, &stores).await;
    assert_eq!(report.source_chunks, 9);
    assert_eq!(report.destination_chunks, 7);
    // Each column of 15 (or the final 10) hears from all 9 row blocks.
    assert_eq!(report.pieces, 63);
    assert_eq!(read_full(&stores.output).await, fill_chunk(&ds, &full_chunk(&ds), 100));
}

#[tokio::test]
async fn test_time_to_space_and_back() {
    let ds = DatasetDescriptor::new([("time", 10), ("x", 20), ("y", 30)])
        .with_variable("foo", Variable::new(["time", "x", "y"], 8));
    let time_split = ChunkScheme::from_lengths([("time", 1), ("x", 20), ("y", 30)]);
    let space_split = ChunkScheme::from_lengths([("time", 10), ("x", 5), ("y", 5)]);
    let expected = fill_chunk(&ds, &full_chunk(&ds), 7);

    let to_space = memory_stores();
    write_dataset(&to_space.input, &ds, &time_split, 7).await;
    let config = RechunkConfig::new(ds.clone(), time_split.clone(), space_split.clone()).with_max_mem(10_000);
    let report = run(config, &to_space).await;
    assert_eq!(report.destination_chunks, 4 * 6);
    assert_eq!(read_full(&to_space.output).await, expected);

    let to_time = memory_stores();
    write_dataset(&to_time.input, &ds, &space_split, 7).await;
    let config = RechunkConfig::new(ds.clone(), space_split, time_split).with_max_mem(10_000);
    let report = run(config, &to_time).await;
    assert_eq!(report.destination_chunks, 10);
    assert_eq!(read_full(&to_time.output).await, expected);
}

#[tokio::test]
async fn test_oversized_source_chunks_are_split() {
    let ds = DatasetDescriptor::new([("time", 10), ("x", 20), ("y", 30)])
        .with_variable("foo", Variable::new(["time", "x", "y"], 8));
    let source = ChunkScheme::from_lengths([("time", -1), ("x", -1), ("y", -1)]);
    let target = ChunkScheme::from_lengths([("time", 1), ("x", -1), ("y", -1)]);
    let stores = memory_stores();
    write_dataset(&stores.input, &ds, &source, 9).await;

    let config = RechunkConfig::new(ds.clone(), source, target).with_max_mem(10_000);
    let plan = RechunkPlanner::new(config).unwrap().plan().unwrap();
    assert!(plan.splitter().is_some());
    assert!(plan.max_intermediate_nbytes() <= 10_000);

    let report = Rechunker::new(plan, stores.input.clone(), stores.output.clone())
        .run(&LocalExecutor::new(2))
        .await
        .unwrap();
    assert_eq!(report.source_chunks, 1);
    assert!(report.intermediate_chunks > 1);
    assert_eq!(report.destination_chunks, 10);
    assert_eq!(read_full(&stores.output).await, fill_chunk(&ds, &full_chunk(&ds), 9));
}

#[tokio::test]
async fn test_explicit_split_chunks() {
    let ds = sample_dataset();
    let source = ChunkScheme::from_lengths([("time", -1), ("x", -1), ("y", -1)]);
    let target = ChunkScheme::from_lengths([("time", 1), ("x", 1), ("y", -1)]);
    let stores = memory_stores();
    write_dataset(&stores.input, &ds, &source, 4).await;

    let config = RechunkConfig::new(ds.clone(), source, target)
        .with_split_chunks(ChunkScheme::from_lengths([("time", 3), ("x", -1), ("y", -1)]));
    let report = run(config, &stores).await;
    assert_eq!(report.intermediate_chunks, 2);
    assert_eq!(report.destination_chunks, 30);
    assert_eq!(read_full(&stores.output).await, fill_chunk(&ds, &full_chunk(&ds), 4));
}

#[tokio::test]
async fn test_corrupt_source_chunk_aborts_run() {
    let ds = sample_dataset();
    let scheme = ChunkScheme::from_lengths([("time", 3), ("x", -1), ("y", -1)]);
    let stores = memory_stores();
    write_dataset(&stores.input, &ds, &scheme, 2).await;
    stores
        .input_backend
        .put("temp/1.0.0", bytes::Bytes::from_static(b"short"))
        .await
        .unwrap();

    let target = ChunkScheme::from_lengths([("time", -1), ("x", 1), ("y", -1)]);
    let err = rechunk(
        RechunkConfig::new(ds, scheme.clone(), target),
        stores.input.clone(),
        stores.output.clone(),
        &LocalExecutor::new(1),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err.as_rechunk_error(),
        Some(Error::BufferSize { variable, .. }) if variable == "temp"
    ));
    // Only the template reached the destination.
    assert_eq!(stores.output_backend.len(), 1);
}

#[tokio::test]
async fn test_source_chunks_must_match_stored_layout() {
    let ds = sample_dataset();
    let stored = ChunkScheme::from_lengths([("time", 1), ("x", -1), ("y", -1)]);
    let claimed = ChunkScheme::from_lengths([("time", 2), ("x", -1), ("y", -1)]);
    let stores = memory_stores();
    write_dataset(&stores.input, &ds, &stored, 6).await;

    let target = ChunkScheme::from_lengths([("time", -1), ("x", 1), ("y", -1)]);
    let err = rechunk(
        RechunkConfig::new(ds, claimed, target),
        stores.input.clone(),
        stores.output.clone(),
        &LocalExecutor::new(2),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Rechunk(Error::Configuration(ref msg)) if msg.contains("source_chunks")
    ));
    // Not even the template was written.
    assert!(stores.output_backend.is_empty());
}

fn time_to_tiles() -> (DatasetDescriptor, RechunkConfig) {
    let ds = sample_dataset();
    let source = ChunkScheme::from_lengths([("time", 1), ("x", -1), ("y", -1)]);
    let target = ChunkScheme::from_lengths([("time", -1), ("x", 2), ("y", 2)]);
    (ds.clone(), RechunkConfig::new(ds, source, target))
}

#[tokio::test]
async fn test_staged_run_matches_in_memory_run() {
    let (ds, config) = time_to_tiles();

    let in_memory = memory_stores();
    write_dataset(&in_memory.input, &ds, &config.source_chunks, 13).await;
    let expected = run(config.clone(), &in_memory).await;

    // Stage into the destination store itself.
    let staged = memory_stores();
    write_dataset(&staged.input, &ds, &config.source_chunks, 13).await;
    let plan = RechunkPlanner::new(config).unwrap().plan().unwrap();
    let staging = PieceStaging::new(staged.output_backend.clone(), DEFAULT_STAGING_PREFIX);
    let report = Rechunker::new(plan, staged.input.clone(), staged.output.clone())
        .with_staging(staging)
        .run(&LocalExecutor::new(3))
        .await
        .unwrap();

    assert_eq!(report, expected);
    assert_eq!(
        snapshot(staged.output_backend.as_ref()).await,
        snapshot(in_memory.output_backend.as_ref()).await
    );
}

#[tokio::test]
async fn test_staging_holds_one_object_per_piece_and_is_cleared() {
    let (ds, config) = time_to_tiles();
    let stores = memory_stores();
    write_dataset(&stores.input, &ds, &config.source_chunks, 17).await;

    let staging_backend = CountingBackend::new();
    staging_backend
        .put(".staging/9.9.9/0.0.0", bytes::Bytes::from_static(b"stale"))
        .await
        .unwrap();
    let puts_before = staging_backend.puts();

    let plan = RechunkPlanner::new(config).unwrap().plan().unwrap();
    let report = Rechunker::new(plan, stores.input.clone(), stores.output.clone())
        .with_staging(PieceStaging::new(staging_backend.clone(), DEFAULT_STAGING_PREFIX))
        .run(&LocalExecutor::new(2))
        .await
        .unwrap();

    // 6 time steps into 3 x 2 tiles.
    assert_eq!(report.pieces, 36);
    assert_eq!(staging_backend.puts() - puts_before, 36);
    assert_eq!(staging_backend.gets(), 36);
    assert!(staging_backend.inner.is_empty());
    assert_eq!(read_full(&stores.output).await, fill_chunk(&ds, &full_chunk(&ds), 17));
}

#[tokio::test]
async fn test_filesystem_stores_end_to_end() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let input = Arc::new(ChunkStore::new(Arc::new(
        FilesystemBackend::new(input_dir.path()).await.unwrap(),
    )));
    let output_backend = Arc::new(FilesystemBackend::new(output_dir.path()).await.unwrap());
    let output = Arc::new(ChunkStore::new(output_backend.clone()));

    let ds = sample_dataset();
    let source = ChunkScheme::from_lengths([("time", 1), ("x", -1), ("y", -1)]);
    let target = ChunkScheme::from_lengths([("time", -1), ("x", 2), ("y", 2)]);
    write_dataset(&input, &ds, &source, 8).await;

    let report = rechunk(
        RechunkConfig::new(ds.clone(), source, target),
        input,
        output.clone(),
        &LocalExecutor::default(),
    )
    .await
    .unwrap();
    assert_eq!(report.destination_chunks, 6);
    assert!(output_dir.path().join("template.json").exists());
    assert!(output_dir.path().join("temp").join("0.2.1").exists());

    // A fresh store over the output directory reads the same dataset.
    let reopened = ChunkStore::new(output_backend);
    assert_eq!(read_full(&reopened).await, fill_chunk(&ds, &full_chunk(&ds), 8));
}
