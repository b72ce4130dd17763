pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{fill_chunk, sample_dataset, seeded_bytes};
#[allow(unused_imports)]
pub use mocks::{CountingBackend, FailingBackend};
