use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::try_join_all;
use futures_util::StreamExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::types::{bytes_stream, join};
use crate::{ChunkStore, FragmentRange, SessionPath, UploadError, UploadResult};

/// Fragment objects are named `patch.<offset>`
const FRAGMENT_PREFIX: &str = "patch.";

/// Where a session stands after a merge-strategy fragment was stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    /// Fewer bytes than declared have been received so far
    Pending { received_bytes: u64 },
    /// All bytes arrived; the final object was written and fragments removed
    Finalized { size_bytes: u64 },
}

/// Merge strategy: each fragment is stored as its own object keyed by offset
/// and the final object is assembled once the byte count reaches the
/// declared length.
///
/// Completion is byte-count based only. Overlapping fragments with different
/// content can trigger finalization without full coverage; clients are
/// expected to resend a range only with identical bytes.
pub struct FragmentMergeEngine {
    store: Arc<dyn ChunkStore>,
    chunks_path: String,
    staging_dir: PathBuf,
}

impl FragmentMergeEngine {
    pub fn new(store: Arc<dyn ChunkStore>, chunks_path: impl Into<String>, staging_dir: PathBuf) -> Self {
        Self {
            store,
            chunks_path: chunks_path.into(),
            staging_dir,
        }
    }

    /// Namespace holding the fragments of one session
    pub fn fragment_prefix(&self, path: &SessionPath) -> String {
        join(&[&self.chunks_path, path.file_name()])
    }

    /// Store one fragment, then finalize if the upload is complete.
    ///
    /// Re-sending an offset overwrites the earlier fragment for it.
    pub async fn ingest_fragment(
        &self,
        path: &SessionPath,
        range: FragmentRange,
        body: Bytes,
    ) -> UploadResult<MergeStatus> {
        let prefix = self.fragment_prefix(path);
        let key = format!("{}/{}{}", prefix, FRAGMENT_PREFIX, range.offset);

        let stored = self.store.put(&key, bytes_stream(body)).await?;
        debug!(
            session = %path.file_name(),
            offset = range.offset,
            size = stored.size_bytes,
            "stored fragment"
        );

        self.try_finalize(path, &prefix, range.declared_length).await
    }

    /// Assemble the final object once the fragments add up to `declared_length`.
    ///
    /// While fewer bytes are present this neither touches the target object
    /// nor the fragment namespace.
    pub async fn try_finalize(
        &self,
        path: &SessionPath,
        prefix: &str,
        declared_length: u64,
    ) -> UploadResult<MergeStatus> {
        let fragments = self.fragments(prefix).await?;
        let received_bytes: u64 = fragments.iter().map(|f| f.size).sum();

        if received_bytes < declared_length {
            return Ok(MergeStatus::Pending { received_bytes });
        }

        let size_bytes = self.assemble(path, &fragments).await?;

        if !self.store.delete_directory(prefix).await? {
            warn!(session = %path.file_name(), prefix, "fragment namespace was not removed");
        }

        info!(
            session = %path.file_name(),
            fragments = fragments.len(),
            size = size_bytes,
            "upload finalized"
        );
        Ok(MergeStatus::Finalized { size_bytes })
    }

    /// Total bytes currently held as fragments for a session
    pub async fn received_bytes(&self, path: &SessionPath) -> UploadResult<u64> {
        let fragments = self.fragments(&self.fragment_prefix(path)).await?;
        Ok(fragments.iter().map(|f| f.size).sum())
    }

    /// Whether any fragments exist for a session
    pub async fn has_fragments(&self, path: &SessionPath) -> UploadResult<bool> {
        Ok(!self.store.list_files(&self.fragment_prefix(path)).await?.is_empty())
    }

    /// Move the bytes an append session already committed before `offset`
    /// into the fragment namespace as `patch.0`, so the merge path can
    /// finish the upload on its own.
    ///
    /// Returns the number of bytes seeded; nothing is written when the
    /// target holds no bytes below `offset`.
    pub async fn seed_from_target(&self, path: &SessionPath, offset: u64) -> UploadResult<u64> {
        if offset == 0 || !self.store.exists(path.as_str()).await? {
            return Ok(0);
        }

        let committed = self.store.size(path.as_str()).await?.min(offset);
        if committed == 0 {
            return Ok(0);
        }
        if committed < offset {
            warn!(
                session = %path.file_name(),
                committed,
                offset,
                "append target is shorter than the fragment offset"
            );
        }

        let source = self.store.read_stream(path.as_str()).await?;
        let prefix = source.scan(committed, |remaining, chunk| {
            let item = match chunk {
                Ok(_) if *remaining == 0 => None,
                Ok(mut bytes) => {
                    if bytes.len() as u64 > *remaining {
                        bytes.truncate(*remaining as usize);
                    }
                    *remaining -= bytes.len() as u64;
                    Some(Ok(bytes))
                }
                Err(e) => Some(Err(e)),
            };
            futures_util::future::ready(item)
        });

        let key = format!("{}/{}0", self.fragment_prefix(path), FRAGMENT_PREFIX);
        let stored = self.store.put(&key, Box::pin(prefix)).await?;
        debug!(session = %path.file_name(), size = stored.size_bytes, "seeded fragments from append target");
        Ok(stored.size_bytes)
    }

    /// Remove a session's fragment namespace
    pub async fn discard(&self, path: &SessionPath) -> UploadResult<bool> {
        self.store.delete_directory(&self.fragment_prefix(path)).await
    }

    /// Fragments under `prefix`, sorted by offset
    async fn fragments(&self, prefix: &str) -> UploadResult<Vec<Fragment>> {
        let mut keyed: Vec<(u64, String)> = self
            .store
            .list_files(prefix)
            .await?
            .into_iter()
            .filter_map(|key| fragment_offset(&key).map(|offset| (offset, key)))
            .collect();
        keyed.sort_by_key(|(offset, _)| *offset);

        try_join_all(keyed.into_iter().map(|(offset, key)| async move {
            let size = self.store.size(&key).await?;
            Ok::<_, UploadError>(Fragment { offset, key, size })
        }))
        .await
    }

    /// Stream fragments in offset order through a local staging file, then
    /// write the staging file as the final object.
    ///
    /// The staging file is removed when this returns, on success or error.
    async fn assemble(&self, path: &SessionPath, fragments: &[Fragment]) -> UploadResult<u64> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let (file, _staging_guard) = tempfile::Builder::new()
            .prefix("dog-upload-merge-")
            .tempfile_in(&self.staging_dir)?
            .into_parts();
        let mut staging = tokio::fs::File::from_std(file);

        for fragment in fragments {
            let mut stream = self.store.read_stream(&fragment.key).await?;
            while let Some(chunk) = stream.next().await {
                staging.write_all(&chunk?).await?;
            }
            debug!(session = %path.file_name(), offset = fragment.offset, "merged fragment");
        }

        staging.flush().await?;
        staging.seek(SeekFrom::Start(0)).await?;

        let result = self
            .store
            .put(path.as_str(), Box::pin(ReaderStream::new(staging)))
            .await?;
        Ok(result.size_bytes)
    }
}

#[derive(Debug)]
struct Fragment {
    offset: u64,
    key: String,
    size: u64,
}

/// Offset encoded in a fragment key's suffix after the final `.`
fn fragment_offset(key: &str) -> Option<u64> {
    let name = key.rsplit('/').next()?;
    if !name.starts_with(FRAGMENT_PREFIX) {
        return None;
    }
    name.rsplit('.').next()?.parse().ok()
}
