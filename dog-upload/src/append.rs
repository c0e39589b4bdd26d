use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::{AppendOutcome, ChunkStore, FragmentRange, SessionPath};

/// Native-append strategy: fragments are appended straight onto the target
/// object, so no merge step is ever needed.
///
/// Appends always land at the object's current end. Fragments for one object
/// must therefore arrive in increasing offset order while this strategy is
/// active; out-of-order fragments are not detected here.
pub struct AppendBackend {
    store: Arc<dyn ChunkStore>,
    max_block_size: u64,
}

impl AppendBackend {
    pub fn new(store: Arc<dyn ChunkStore>, max_block_size: u64) -> Self {
        Self {
            store,
            max_block_size: max_block_size.max(1),
        }
    }

    /// Whether the backing store offers native append at all
    pub fn is_available(&self) -> bool {
        self.store.native_append().is_some()
    }

    /// Create the empty append target for a new session.
    ///
    /// Returns false when the store cannot append or creation failed; the
    /// caller then falls back to a placeholder write.
    pub async fn create_target(&self, path: &SessionPath, content_type: Option<&str>) -> bool {
        let Some(append) = self.store.native_append() else {
            return false;
        };

        match append.create_append_target(path.as_str(), content_type).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session = %path.file_name(), error = %e, "append target creation failed");
                false
            }
        }
    }

    /// Append one fragment body, split into blocks no larger than the
    /// configured ceiling and issued strictly in order.
    pub async fn append_fragment(
        &self,
        path: &SessionPath,
        range: FragmentRange,
        body: Bytes,
        content_type: Option<&str>,
    ) -> AppendOutcome {
        let Some(append) = self.store.native_append() else {
            return AppendOutcome::FallbackRequired;
        };

        match append.is_append_target(path.as_str()).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(session = %path.file_name(), "no append target for session");
                return AppendOutcome::FallbackRequired;
            }
            Err(e) => {
                warn!(session = %path.file_name(), error = %e, "append target probe failed");
                return AppendOutcome::FallbackRequired;
            }
        }

        let blocks = split_blocks(body, self.max_block_size);
        debug!(
            session = %path.file_name(),
            offset = range.offset,
            length = range.declared_length,
            blocks = blocks.len(),
            content_type = content_type.unwrap_or("application/octet-stream"),
            "appending fragment"
        );

        for (index, block) in blocks.into_iter().enumerate() {
            if let Err(e) = append.append_block(path.as_str(), block).await {
                warn!(
                    session = %path.file_name(),
                    offset = range.offset,
                    block = index,
                    error = %e,
                    "append failed"
                );
                return AppendOutcome::FallbackRequired;
            }
        }

        AppendOutcome::Done
    }
}

/// Split `body` into consecutive zero-copy slices of at most `max` bytes
pub(crate) fn split_blocks(body: Bytes, max: u64) -> Vec<Bytes> {
    let max = usize::try_from(max).unwrap_or(usize::MAX).max(1);
    (0..body.len())
        .step_by(max)
        .map(|start| body.slice(start..(start + max).min(body.len())))
        .collect()
}
