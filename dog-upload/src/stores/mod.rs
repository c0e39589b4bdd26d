//! Concrete [`ChunkStore`](crate::ChunkStore) backends

mod local;
mod memory;
mod s3;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::{S3Config, S3Store};
