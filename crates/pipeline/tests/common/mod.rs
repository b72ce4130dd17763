pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{era5, fill_chunk, read_full, sample_dataset, snapshot, write_dataset};
#[allow(unused_imports)]
pub use mocks::CountingBackend;
