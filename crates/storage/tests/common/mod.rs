pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{open_filesystem_store, open_memory_store, seeded_bytes};
#[allow(unused_imports)]
pub use mocks::{BrokenDatastore, CountingDatastore};
