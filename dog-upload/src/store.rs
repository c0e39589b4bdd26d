use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{ByteStream, UploadError, UploadResult};

/// Object storage primitives every backend must provide.
///
/// Paths are `/`-separated, storage-relative keys. A "directory" is any key
/// prefix; backends without real directories emulate them.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Write an object from a stream, replacing any existing content
    async fn put(&self, path: &str, stream: ByteStream) -> UploadResult<PutResult>;

    /// Read an object as a stream
    async fn read_stream(&self, path: &str) -> UploadResult<ByteStream>;

    /// Size of an object in bytes
    async fn size(&self, path: &str) -> UploadResult<u64>;

    /// Whether an object exists at `path`
    async fn exists(&self, path: &str) -> UploadResult<bool>;

    /// Full paths of all objects directly under `prefix`
    async fn list_files(&self, prefix: &str) -> UploadResult<Vec<String>>;

    /// Delete a single object; missing objects are not an error
    async fn delete(&self, path: &str) -> UploadResult<()>;

    /// Delete everything under `prefix`. Returns false when the backend
    /// reports that the removal did not happen.
    async fn delete_directory(&self, prefix: &str) -> UploadResult<bool>;

    /// Native append capability, if this backend offers it
    fn native_append(&self) -> Option<&dyn NativeAppendStore> {
        None
    }

    /// Short name of the backend, for logs
    fn driver(&self) -> &'static str;
}

/// Optional capability: sequential append directly onto the target object
#[async_trait]
pub trait NativeAppendStore: Send + Sync {
    /// Create an empty append target at `path`, replacing anything there
    async fn create_append_target(&self, path: &str, content_type: Option<&str>) -> UploadResult<()>;

    /// Append one block to the end of the target
    async fn append_block(&self, path: &str, block: Bytes) -> UploadResult<()>;

    /// Whether `path` is an append target created by this backend
    async fn is_append_target(&self, path: &str) -> UploadResult<bool>;
}

/// Result of a successful put operation
#[derive(Debug, Clone)]
pub struct PutResult {
    pub size_bytes: u64,
    pub etag: Option<String>,
}

/// Named storage backends ("disks") the session disk is selected from
#[derive(Clone, Default)]
pub struct DiskRegistry {
    disks: HashMap<String, Arc<dyn ChunkStore>>,
}

impl DiskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under `name`
    pub fn with_disk<S, N>(mut self, name: N, store: S) -> Self
    where
        S: ChunkStore + 'static,
        N: Into<String>,
    {
        self.disks.insert(name.into(), Arc::new(store));
        self
    }

    /// Register an already shared backend under `name`
    pub fn with_shared_disk<N: Into<String>>(mut self, name: N, store: Arc<dyn ChunkStore>) -> Self {
        self.disks.insert(name.into(), store);
        self
    }

    /// Resolve a disk by name
    pub fn disk(&self, name: &str) -> UploadResult<Arc<dyn ChunkStore>> {
        self.disks
            .get(name)
            .cloned()
            .ok_or_else(|| UploadError::config(format!("unknown disk: {}", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.disks.keys().map(|k| k.as_str())
    }
}

impl std::fmt::Debug for DiskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskRegistry")
            .field("disks", &self.disks.keys().collect::<Vec<_>>())
            .finish()
    }
}
