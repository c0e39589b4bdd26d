use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::sync::RwLock;

use crate::store::{ChunkStore, NativeAppendStore, PutResult};
use crate::types::bytes_stream;
use crate::{ByteStream, UploadError, UploadResult};

#[derive(Debug, Clone)]
struct MemoryObject {
    data: BytesMut,
    append_target: bool,
    content_type: Option<String>,
}

/// In-process store, optionally append-capable
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    native_append: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose the [`NativeAppendStore`] capability
    pub fn with_native_append(mut self) -> Self {
        self.native_append = true;
        self
    }

    /// Snapshot of an object's bytes
    pub async fn contents(&self, path: &str) -> Option<Bytes> {
        let objects = self.objects.read().await;
        objects.get(path).map(|o| o.data.clone().freeze())
    }

    /// Content type recorded when the append target was created
    pub async fn content_type(&self, path: &str) -> Option<String> {
        let objects = self.objects.read().await;
        objects.get(path).and_then(|o| o.content_type.clone())
    }

    /// All stored paths, in order
    pub async fn paths(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

fn dir_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn put(&self, path: &str, mut stream: ByteStream) -> UploadResult<PutResult> {
        let mut data = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
        }

        let size_bytes = data.len() as u64;
        self.objects.write().await.insert(
            path.to_string(),
            MemoryObject {
                data,
                append_target: false,
                content_type: None,
            },
        );

        Ok(PutResult {
            size_bytes,
            etag: None,
        })
    }

    async fn read_stream(&self, path: &str) -> UploadResult<ByteStream> {
        let data = self
            .contents(path)
            .await
            .ok_or_else(|| UploadError::storage(format!("object not found: {}", path)))?;
        Ok(bytes_stream(data))
    }

    async fn size(&self, path: &str) -> UploadResult<u64> {
        let objects = self.objects.read().await;
        objects
            .get(path)
            .map(|o| o.data.len() as u64)
            .ok_or_else(|| UploadError::storage(format!("object not found: {}", path)))
    }

    async fn exists(&self, path: &str) -> UploadResult<bool> {
        Ok(self.objects.read().await.contains_key(path))
    }

    async fn list_files(&self, prefix: &str) -> UploadResult<Vec<String>> {
        let dir = dir_prefix(prefix);
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|k| k.strip_prefix(&dir).is_some_and(|rest| !rest.contains('/')))
            .cloned()
            .collect())
    }

    async fn delete(&self, path: &str) -> UploadResult<()> {
        self.objects.write().await.remove(path);
        Ok(())
    }

    async fn delete_directory(&self, prefix: &str) -> UploadResult<bool> {
        let dir = dir_prefix(prefix);
        self.objects.write().await.retain(|k, _| !k.starts_with(&dir));
        Ok(true)
    }

    fn native_append(&self) -> Option<&dyn NativeAppendStore> {
        if self.native_append {
            Some(self)
        } else {
            None
        }
    }

    fn driver(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl NativeAppendStore for MemoryStore {
    async fn create_append_target(&self, path: &str, content_type: Option<&str>) -> UploadResult<()> {
        self.objects.write().await.insert(
            path.to_string(),
            MemoryObject {
                data: BytesMut::new(),
                append_target: true,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn append_block(&self, path: &str, block: Bytes) -> UploadResult<()> {
        let mut objects = self.objects.write().await;
        match objects.get_mut(path) {
            Some(object) if object.append_target => {
                object.data.extend_from_slice(&block);
                Ok(())
            }
            Some(_) => Err(UploadError::storage(format!("not an append target: {}", path))),
            None => Err(UploadError::storage(format!("object not found: {}", path))),
        }
    }

    async fn is_append_target(&self, path: &str) -> UploadResult<bool> {
        let objects = self.objects.read().await;
        Ok(objects.get(path).is_some_and(|o| o.append_target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_direct_children() {
        let store = MemoryStore::new();
        for path in ["chunks/a/patch.0", "chunks/a/patch.5", "chunks/a/nested/x", "chunks/ab/patch.0"] {
            store.put(path, bytes_stream(Bytes::from_static(b"x"))).await.unwrap();
        }

        let listed = store.list_files("chunks/a").await.unwrap();
        assert_eq!(listed, vec!["chunks/a/patch.0", "chunks/a/patch.5"]);
    }

    #[tokio::test]
    async fn delete_directory_is_prefix_scoped() {
        let store = MemoryStore::new();
        store.put("s/a/file", bytes_stream(Bytes::from_static(b"1"))).await.unwrap();
        store.put("s/ab/file", bytes_stream(Bytes::from_static(b"2"))).await.unwrap();

        assert!(store.delete_directory("s/a").await.unwrap());
        assert_eq!(store.paths().await, vec!["s/ab/file"]);
    }

    #[tokio::test]
    async fn capability_is_opt_in() {
        assert!(MemoryStore::new().native_append().is_none());
        assert!(MemoryStore::new().with_native_append().native_append().is_some());
    }

    #[tokio::test]
    async fn append_requires_an_append_target() {
        let store = MemoryStore::new().with_native_append();
        store.put("plain", bytes_stream(Bytes::new())).await.unwrap();
        assert!(store.append_block("plain", Bytes::from_static(b"x")).await.is_err());

        store.create_append_target("blob", Some("text/plain")).await.unwrap();
        store.append_block("blob", Bytes::from_static(b"ab")).await.unwrap();
        store.append_block("blob", Bytes::from_static(b"cd")).await.unwrap();
        assert_eq!(store.contents("blob").await.unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(store.content_type("blob").await.as_deref(), Some("text/plain"));
    }
}
