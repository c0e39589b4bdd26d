use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use dog_upload::{
    ByteStream, ChunkStore, IdentityCodec, LocalStore, MemoryStore, NativeAppendStore, PutResult,
    UploadConfig, UploadError, UploadResult, UploadSessionController,
};

const MIB: usize = 1024 * 1024;

/// Test factory functions
fn codec() -> IdentityCodec {
    IdentityCodec::new(&[11u8; 32]).unwrap()
}

fn config(staging: &std::path::Path) -> UploadConfig {
    UploadConfig::new().with_staging_dir(staging)
}

fn controller(store: Arc<dyn ChunkStore>, staging: &std::path::Path) -> UploadSessionController {
    UploadSessionController::with_store(config(staging), codec(), store)
}

/// Deterministic, non-repeating-looking payload
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) ^ (i >> 8)) as u8).collect()
}

async fn send(ctl: &UploadSessionController, id: &str, offset: usize, total: usize, body: &[u8]) {
    ctl.handle_fragment(
        Some(id),
        Some(&offset.to_string()),
        Some(&total.to_string()),
        Bytes::copy_from_slice(body),
        None,
    )
    .await
    .unwrap();
}

/// Append-capable memory store whose appends start failing after `ok_appends` calls
struct FlakyAppendStore {
    inner: MemoryStore,
    ok_appends: usize,
    appends: Mutex<usize>,
}

impl FlakyAppendStore {
    fn new(ok_appends: usize) -> Self {
        Self {
            inner: MemoryStore::new().with_native_append(),
            ok_appends,
            appends: Mutex::new(0),
        }
    }
}

#[async_trait]
impl ChunkStore for FlakyAppendStore {
    async fn put(&self, path: &str, stream: ByteStream) -> UploadResult<PutResult> {
        self.inner.put(path, stream).await
    }
    async fn read_stream(&self, path: &str) -> UploadResult<ByteStream> {
        self.inner.read_stream(path).await
    }
    async fn size(&self, path: &str) -> UploadResult<u64> {
        self.inner.size(path).await
    }
    async fn exists(&self, path: &str) -> UploadResult<bool> {
        self.inner.exists(path).await
    }
    async fn list_files(&self, prefix: &str) -> UploadResult<Vec<String>> {
        self.inner.list_files(prefix).await
    }
    async fn delete(&self, path: &str) -> UploadResult<()> {
        self.inner.delete(path).await
    }
    async fn delete_directory(&self, prefix: &str) -> UploadResult<bool> {
        self.inner.delete_directory(prefix).await
    }
    fn native_append(&self) -> Option<&dyn NativeAppendStore> {
        Some(self)
    }
    fn driver(&self) -> &'static str {
        "flaky"
    }
}

#[async_trait]
impl NativeAppendStore for FlakyAppendStore {
    async fn create_append_target(&self, path: &str, content_type: Option<&str>) -> UploadResult<()> {
        self.inner.create_append_target(path, content_type).await
    }
    async fn append_block(&self, path: &str, block: Bytes) -> UploadResult<()> {
        let mut appends = self.appends.lock().await;
        *appends += 1;
        if *appends > self.ok_appends {
            return Err(UploadError::storage("append block rejected"));
        }
        self.inner.append_block(path, block).await
    }
    async fn is_append_target(&self, path: &str) -> UploadResult<bool> {
        self.inner.is_append_target(path).await
    }
}

/// Memory store that can refuse writes and directory removal on demand
struct FailingStore {
    inner: MemoryStore,
    fail_writes: bool,
    keep_directories: bool,
}

impl FailingStore {
    fn new(fail_writes: bool, keep_directories: bool) -> Self {
        Self {
            inner: MemoryStore::new().with_native_append(),
            fail_writes,
            keep_directories,
        }
    }
}

#[async_trait]
impl ChunkStore for FailingStore {
    async fn put(&self, path: &str, stream: ByteStream) -> UploadResult<PutResult> {
        if self.fail_writes {
            return Err(UploadError::storage("bucket is read-only"));
        }
        self.inner.put(path, stream).await
    }
    async fn read_stream(&self, path: &str) -> UploadResult<ByteStream> {
        self.inner.read_stream(path).await
    }
    async fn size(&self, path: &str) -> UploadResult<u64> {
        self.inner.size(path).await
    }
    async fn exists(&self, path: &str) -> UploadResult<bool> {
        self.inner.exists(path).await
    }
    async fn list_files(&self, prefix: &str) -> UploadResult<Vec<String>> {
        self.inner.list_files(prefix).await
    }
    async fn delete(&self, path: &str) -> UploadResult<()> {
        self.inner.delete(path).await
    }
    async fn delete_directory(&self, prefix: &str) -> UploadResult<bool> {
        if self.keep_directories {
            return Ok(false);
        }
        self.inner.delete_directory(prefix).await
    }
    fn native_append(&self) -> Option<&dyn NativeAppendStore> {
        Some(self)
    }
    fn driver(&self) -> &'static str {
        "failing"
    }
}

#[async_trait]
impl NativeAppendStore for FailingStore {
    async fn create_append_target(&self, path: &str, content_type: Option<&str>) -> UploadResult<()> {
        if self.fail_writes {
            return Err(UploadError::storage("bucket is read-only"));
        }
        self.inner.create_append_target(path, content_type).await
    }
    async fn append_block(&self, path: &str, block: Bytes) -> UploadResult<()> {
        self.inner.append_block(path, block).await
    }
    async fn is_append_target(&self, path: &str) -> UploadResult<bool> {
        self.inner.is_append_target(path).await
    }
}

/// Initialize "report.pdf" (10 MiB), send both halves in reverse order, then delete
#[tokio::test]
async fn test_report_pdf_end_to_end() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let ctl = controller(store.clone(), staging.path());

    let total = 10 * MIB;
    let data = payload(total);

    let id = ctl.initialize_session(Some("report.pdf"), None).await.unwrap();
    let path = ctl.resolve(Some(id.as_str())).unwrap();
    assert!(path.file_name().ends_with("-report.pdf"));

    send(&ctl, id.as_str(), 5_242_880, total, &data[5 * MIB..]).await;
    assert_eq!(store.contents(path.as_str()).await.unwrap().len(), 0);

    send(&ctl, id.as_str(), 0, total, &data[..5 * MIB]).await;

    let finished = store.contents(path.as_str()).await.unwrap();
    assert_eq!(finished.len(), total);
    assert!(finished[..] == data[..]);

    ctl.delete_session(Some(id.as_str())).await.unwrap();
    assert!(!store.exists(path.as_str()).await.unwrap());
    assert!(store.list_files(path.parent()).await.unwrap().is_empty());
}

/// Every arrival order of four fragments reassembles the same bytes
#[tokio::test]
async fn test_merge_is_order_independent() {
    let data = payload(1000);
    let cuts = [(0usize, 100usize), (100, 350), (350, 351), (351, 1000)];
    let orders: [[usize; 4]; 6] = [
        [0, 1, 2, 3],
        [3, 2, 1, 0],
        [1, 3, 0, 2],
        [2, 0, 3, 1],
        [3, 0, 1, 2],
        [0, 3, 2, 1],
    ];

    for order in orders {
        let staging = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let ctl = controller(store.clone(), staging.path());
        let id = ctl.initialize_session(Some("data.bin"), None).await.unwrap();
        let path = ctl.resolve(Some(id.as_str())).unwrap();

        for index in order {
            let (start, end) = cuts[index];
            send(&ctl, id.as_str(), start, data.len(), &data[start..end]).await;
        }

        assert_eq!(store.contents(path.as_str()).await.unwrap(), Bytes::from(data.clone()), "order {:?}", order);
    }
}

/// Re-sending an already written offset with identical bytes changes nothing
#[tokio::test]
async fn test_idempotent_resend() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let ctl = controller(store.clone(), staging.path());
    let data = payload(64);

    let id = ctl.initialize_session(None, None).await.unwrap();
    let path = ctl.resolve(Some(id.as_str())).unwrap();

    send(&ctl, id.as_str(), 0, 64, &data[..32]).await;
    send(&ctl, id.as_str(), 0, 64, &data[..32]).await;
    assert_eq!(ctl.received_bytes(Some(id.as_str())).await.unwrap(), 32);

    send(&ctl, id.as_str(), 32, 64, &data[32..]).await;
    assert_eq!(store.contents(path.as_str()).await.unwrap(), Bytes::from(data));
}

/// Nothing is merged or cleaned up while bytes are still missing
#[tokio::test]
async fn test_completion_gating() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let ctl = controller(store.clone(), staging.path());

    let id = ctl.initialize_session(Some("a.txt"), None).await.unwrap();
    let path = ctl.resolve(Some(id.as_str())).unwrap();

    send(&ctl, id.as_str(), 0, 9, b"abc").await;
    send(&ctl, id.as_str(), 6, 9, b"ghi").await;

    assert_eq!(store.contents(path.as_str()).await.unwrap().len(), 0);
    let chunk_prefix = format!("filepond/chunks/{}", path.file_name());
    assert_eq!(store.list_files(&chunk_prefix).await.unwrap().len(), 2);
    assert_eq!(ctl.received_bytes(Some(id.as_str())).await.unwrap(), 6);

    send(&ctl, id.as_str(), 3, 9, b"def").await;
    assert_eq!(store.contents(path.as_str()).await.unwrap(), Bytes::from_static(b"abcdefghi"));
    assert!(store.list_files(&chunk_prefix).await.unwrap().is_empty());
}

/// Fragments below the declared length can be ingested concurrently
#[tokio::test]
async fn test_concurrent_fragments() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let ctl = Arc::new(controller(store.clone(), staging.path()));
    let data = Arc::new(payload(16 * 100));

    let id = ctl.initialize_session(Some("burst.bin"), None).await.unwrap();
    let path = ctl.resolve(Some(id.as_str())).unwrap();

    let mut handles = Vec::new();
    for index in 1..16usize {
        let ctl = ctl.clone();
        let data = data.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let start = index * 100;
            send(&ctl, id.as_str(), start, data.len(), &data[start..start + 100]).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    send(&ctl, id.as_str(), 0, data.len(), &data[..100]).await;
    assert_eq!(store.contents(path.as_str()).await.unwrap(), Bytes::from(data.to_vec()));
}

/// Append path: in-order fragments land directly on the target object
#[tokio::test]
async fn test_append_strategy_in_order() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new().with_native_append());
    let cfg = config(staging.path()).with_max_append_block_size(7).unwrap();
    let ctl = UploadSessionController::with_store(cfg, codec(), store.clone());
    let data = payload(50);

    let id = ctl.initialize_session(Some("log.txt"), Some("text/plain")).await.unwrap();
    let path = ctl.resolve(Some(id.as_str())).unwrap();

    send(&ctl, id.as_str(), 0, 50, &data[..20]).await;
    send(&ctl, id.as_str(), 20, 50, &data[20..]).await;

    assert_eq!(store.contents(path.as_str()).await.unwrap(), Bytes::from(data));
    assert!(store.list_files("filepond/chunks").await.unwrap().is_empty());
    assert_eq!(ctl.received_bytes(Some(id.as_str())).await.unwrap(), 50);
}

/// An append failing mid-fragment re-ingests that fragment through merge without duplicated bytes
#[tokio::test]
async fn test_fallback_after_partial_append() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(FlakyAppendStore::new(1));
    let cfg = config(staging.path()).with_max_append_block_size(4).unwrap();
    let ctl = UploadSessionController::with_store(cfg, codec(), store.clone());
    let data = payload(10);

    let id = ctl.initialize_session(Some("x.bin"), None).await.unwrap();
    let path = ctl.resolve(Some(id.as_str())).unwrap();

    send(&ctl, id.as_str(), 0, 10, &data).await;

    assert_eq!(*store.appends.lock().await, 2);
    assert_eq!(store.inner.contents(path.as_str()).await.unwrap(), Bytes::from(data));
}

/// An append failing on a later fragment moves the whole session onto merge
#[tokio::test]
async fn test_fallback_mid_session() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(FlakyAppendStore::new(3));
    let cfg = config(staging.path()).with_max_append_block_size(4).unwrap();
    let ctl = UploadSessionController::with_store(cfg, codec(), store.clone());
    let data = payload(24);

    let id = ctl.initialize_session(Some("m.bin"), None).await.unwrap();
    let path = ctl.resolve(Some(id.as_str())).unwrap();

    // blocks 1-2 append, block 3 appends, block 4 fails and triggers the fallback
    send(&ctl, id.as_str(), 0, 24, &data[..8]).await;
    send(&ctl, id.as_str(), 8, 24, &data[8..16]).await;
    assert_eq!(ctl.received_bytes(Some(id.as_str())).await.unwrap(), 16);

    send(&ctl, id.as_str(), 16, 24, &data[16..]).await;

    assert_eq!(*store.appends.lock().await, 4);
    assert_eq!(store.inner.contents(path.as_str()).await.unwrap(), Bytes::from(data));
    let chunk_prefix = format!("filepond/chunks/{}", path.file_name());
    assert!(store.list_files(&chunk_prefix).await.unwrap().is_empty());
}

/// A store whose appends always fail still completes multi-fragment uploads via merge
#[tokio::test]
async fn test_fallback_for_every_fragment() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(FlakyAppendStore::new(0));
    let ctl = controller(store.clone(), staging.path());
    let data = payload(300);

    let id = ctl.initialize_session(Some("y.bin"), None).await.unwrap();
    let path = ctl.resolve(Some(id.as_str())).unwrap();

    send(&ctl, id.as_str(), 200, 300, &data[200..]).await;
    send(&ctl, id.as_str(), 0, 300, &data[..200]).await;

    assert_eq!(store.inner.contents(path.as_str()).await.unwrap(), Bytes::from(data));
}

/// Filesystem backend, merge strategy, with the session removed at the end
#[tokio::test]
async fn test_local_store_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let store: Arc<dyn ChunkStore> = Arc::new(LocalStore::new(root.path()));
    let ctl = controller(store, staging.path());
    let data = payload(3 * 4096 + 17);

    let id = ctl.initialize_session(Some("photo.jpg"), None).await.unwrap();
    let path = ctl.resolve(Some(id.as_str())).unwrap();

    send(&ctl, id.as_str(), 4096, data.len(), &data[4096..]).await;
    send(&ctl, id.as_str(), 0, data.len(), &data[..4096]).await;

    let on_disk = std::fs::read(root.path().join(path.as_str())).unwrap();
    assert_eq!(on_disk, data);
    assert!(!root.path().join("filepond/chunks").join(path.file_name()).exists());

    ctl.delete_session(Some(id.as_str())).await.unwrap();
    assert!(!root.path().join(path.parent()).exists());
    assert!(root.path().join("filepond").exists());
}

/// A tampered identity is rejected before anything touches the store
#[tokio::test]
async fn test_tampered_identity_is_rejected() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let ctl = controller(store.clone(), staging.path());

    let id = ctl.initialize_session(Some("a.txt"), None).await.unwrap();
    let mut tampered = id.into_string().into_bytes();
    let mid = tampered.len() / 2;
    tampered[mid] = if tampered[mid] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    let before = store.paths().await;
    let err = ctl
        .handle_fragment(Some(&tampered), Some("0"), Some("1"), Bytes::from_static(b"x"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::InvalidIdentity));
    assert_eq!(store.paths().await, before);
    assert!(matches!(
        ctl.delete_session(Some(&tampered)).await,
        Err(UploadError::InvalidIdentity)
    ));
}

/// Neither an append target nor a placeholder can be written
#[tokio::test]
async fn test_initialize_reports_unavailable_storage() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(FailingStore::new(true, false));
    let ctl = controller(store.clone(), staging.path());

    let err = ctl.initialize_session(Some("a.txt"), None).await.unwrap_err();

    assert!(matches!(err, UploadError::StorageUnavailable { .. }));
    assert_eq!(err.status_code(), 500);
    assert!(store.inner.paths().await.is_empty());
}

/// A session directory the store refuses to remove is a storage error
#[tokio::test]
async fn test_delete_reports_storage_failure() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(FailingStore::new(false, true));
    let ctl = controller(store.clone(), staging.path());

    let id = ctl.initialize_session(Some("a.txt"), None).await.unwrap();
    let err = ctl.delete_session(Some(id.as_str())).await.unwrap_err();

    assert!(matches!(err, UploadError::Storage { .. }));
    assert_eq!(err.status_code(), 500);
}
