use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::store::{ChunkStore, NativeAppendStore, PutResult};
use crate::{ByteStream, UploadError, UploadResult};

/// Name prefix of in-flight `put` files, hidden from listings
const STAGING_PREFIX: &str = ".dog-upload-put-";

/// Filesystem store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    native_append: bool,
}

impl LocalStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            native_append: false,
        }
    }

    /// Expose the [`NativeAppendStore`] capability (files opened in append mode)
    pub fn with_native_append(mut self) -> Self {
        self.native_append = true;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage key onto the root; keys may not climb out of it
    fn resolve(&self, path: &str) -> UploadResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(UploadError::storage(format!("path escapes store root: {}", path)));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(target: &Path) -> UploadResult<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for LocalStore {
    async fn put(&self, path: &str, mut stream: ByteStream) -> UploadResult<PutResult> {
        let target = self.resolve(path)?;
        Self::ensure_parent(&target).await?;

        // Written beside the target and renamed over it; dropped on error
        let dir = target.parent().unwrap_or(&self.root);
        let (file, staged) = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(dir)?
            .into_parts();
        let mut file = fs::File::from_std(file);

        let mut size_bytes = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        staged.persist(&target).map_err(|e| e.error)?;

        Ok(PutResult {
            size_bytes,
            etag: None,
        })
    }

    async fn read_stream(&self, path: &str) -> UploadResult<ByteStream> {
        let file = fs::File::open(self.resolve(path)?).await?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn size(&self, path: &str) -> UploadResult<u64> {
        Ok(fs::metadata(self.resolve(path)?).await?.len())
    }

    async fn exists(&self, path: &str) -> UploadResult<bool> {
        Ok(fs::try_exists(self.resolve(path)?).await?)
    }

    async fn list_files(&self, prefix: &str) -> UploadResult<Vec<String>> {
        let dir = self.resolve(prefix)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let prefix = prefix.trim_matches('/');
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if !name.starts_with(STAGING_PREFIX) => files.push(format!("{}/{}", prefix, name)),
                _ => {}
            }
        }
        files.sort();
        Ok(files)
    }

    async fn delete(&self, path: &str) -> UploadResult<()> {
        match fs::remove_file(self.resolve(path)?).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn delete_directory(&self, prefix: &str) -> UploadResult<bool> {
        let dir = self.resolve(prefix)?;
        if dir == self.root {
            return Ok(false);
        }
        match fs::remove_dir_all(dir).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(true),
        }
    }

    fn native_append(&self) -> Option<&dyn NativeAppendStore> {
        if self.native_append {
            Some(self)
        } else {
            None
        }
    }

    fn driver(&self) -> &'static str {
        "local"
    }
}

#[async_trait]
impl NativeAppendStore for LocalStore {
    async fn create_append_target(&self, path: &str, _content_type: Option<&str>) -> UploadResult<()> {
        let target = self.resolve(path)?;
        Self::ensure_parent(&target).await?;
        fs::File::create(&target).await?;
        Ok(())
    }

    async fn append_block(&self, path: &str, block: Bytes) -> UploadResult<()> {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(self.resolve(path)?)
            .await?;
        file.write_all(&block).await?;
        file.flush().await?;
        Ok(())
    }

    async fn is_append_target(&self, path: &str) -> UploadResult<bool> {
        match fs::metadata(self.resolve(path)?).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
