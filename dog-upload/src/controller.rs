use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info, instrument, warn};

use crate::merge::MergeStatus;
use crate::types::bytes_stream;
use crate::{
    AppendBackend, AppendOutcome, ByteStream, ChunkStore, DiskRegistry, EncodedIdentity,
    FragmentMergeEngine, FragmentRange, IdentityCodec, SessionPath, SessionToken, UploadConfig,
    UploadError, UploadResult,
};

/// Orchestrates session initialization, fragment ingestion with strategy
/// selection and fallback, and session deletion.
///
/// Holds no per-session state: everything about a session lives in the
/// store and in the identity the client presents on each call, so any
/// number of controllers may serve the same sessions.
pub struct UploadSessionController {
    config: UploadConfig,
    codec: IdentityCodec,
    store: Arc<dyn ChunkStore>,
    append: AppendBackend,
    merge: FragmentMergeEngine,
}

impl UploadSessionController {
    /// Build a controller on the disk named by `config.temporary_files_disk`
    pub fn new(config: UploadConfig, codec: IdentityCodec, disks: &DiskRegistry) -> UploadResult<Self> {
        let store = disks.disk(&config.temporary_files_disk)?;
        Ok(Self::with_store(config, codec, store))
    }

    /// Build a controller on an explicit store
    pub fn with_store(config: UploadConfig, codec: IdentityCodec, store: Arc<dyn ChunkStore>) -> Self {
        let append = AppendBackend::new(store.clone(), config.max_append_block_size);
        let merge = FragmentMergeEngine::new(store.clone(), config.chunks_path.clone(), config.staging_dir());

        Self {
            config,
            codec,
            store,
            append,
            merge,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Start a chunked upload and return the identity the client must present
    /// on every following call.
    ///
    /// On append-capable stores an empty append target is created; any
    /// failure there degrades to a zero-length placeholder written with a
    /// plain put. Only when that also fails is the store reported unavailable.
    #[instrument(skip_all, fields(session = tracing::field::Empty))]
    pub async fn initialize_session(
        &self,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> UploadResult<EncodedIdentity> {
        let path = self.derive_path(filename);
        tracing::Span::current().record("session", path.file_name());

        let strategy = if self.append.is_available() && self.append.create_target(&path, content_type).await {
            "append"
        } else {
            if self.append.is_available() {
                warn!(driver = self.store.driver(), "append target unavailable, using placeholder");
            }
            self.store
                .put(path.as_str(), bytes_stream(Bytes::new()))
                .await
                .map_err(|e| {
                    error!(driver = self.store.driver(), error = %e, "placeholder write failed");
                    UploadError::unavailable("could not create upload target")
                })?;
            "merge"
        };

        info!(driver = self.store.driver(), strategy, "upload session initialized");
        self.encode(&path)
    }

    /// Single-shot upload: store the whole body under a fresh session path
    #[instrument(skip_all, fields(session = tracing::field::Empty))]
    pub async fn store_simple(&self, filename: Option<&str>, body: ByteStream) -> UploadResult<EncodedIdentity> {
        let path = self.derive_path(filename);
        tracing::Span::current().record("session", path.file_name());

        let stored = self.store.put(path.as_str(), body).await.map_err(|e| {
            error!(driver = self.store.driver(), error = %e, "simple upload failed");
            UploadError::unavailable("could not store upload")
        })?;

        info!(size = stored.size_bytes, "simple upload stored");
        self.encode(&path)
    }

    /// Ingest one fragment of a chunked upload.
    ///
    /// Validation order: identity present, identity authentic, range numeric.
    /// Success means the fragment is durable, not that the file is complete;
    /// completion happens silently once the last byte arrives.
    #[instrument(skip_all, fields(session = tracing::field::Empty))]
    pub async fn handle_fragment(
        &self,
        identity: Option<&str>,
        offset: Option<&str>,
        declared_length: Option<&str>,
        body: Bytes,
        content_type: Option<&str>,
    ) -> UploadResult<()> {
        let path = self.resolve(identity)?;
        tracing::Span::current().record("session", path.file_name());

        let range = FragmentRange::parse(offset, declared_length)?;
        self.ingest(&path, range, body, content_type).await
    }

    /// Route a validated fragment to the append strategy when the store
    /// offers it, re-ingesting through the merge strategy on fallback.
    ///
    /// A fallback is permanent for the session: bytes the target already
    /// holds below the failed offset are seeded into the fragment namespace,
    /// and once that namespace exists every later fragment is merged.
    pub async fn ingest(
        &self,
        path: &SessionPath,
        range: FragmentRange,
        body: Bytes,
        content_type: Option<&str>,
    ) -> UploadResult<()> {
        if self.append.is_available() && !self.merge.has_fragments(path).await? {
            match self.append.append_fragment(path, range, body.clone(), content_type).await {
                AppendOutcome::Done => return Ok(()),
                AppendOutcome::FallbackRequired => {
                    warn!(offset = range.offset, "append strategy unavailable, merging fragment");
                    self.merge.seed_from_target(path, range.offset).await?;
                }
            }
        }

        match self.merge.ingest_fragment(path, range, body).await? {
            MergeStatus::Pending { received_bytes } => {
                debug!(received_bytes, declared = range.declared_length, "fragment stored");
            }
            MergeStatus::Finalized { size_bytes } => {
                debug!(size_bytes, "fragments merged");
            }
        }
        Ok(())
    }

    /// Bytes received so far, so a client can resume from that offset
    #[instrument(skip_all, fields(session = tracing::field::Empty))]
    pub async fn received_bytes(&self, identity: Option<&str>) -> UploadResult<u64> {
        let path = self.resolve(identity)?;
        tracing::Span::current().record("session", path.file_name());

        if self.merge.has_fragments(&path).await? {
            return self.merge.received_bytes(&path).await;
        }
        if !self.store.exists(path.as_str()).await? {
            return Err(UploadError::SessionNotFound);
        }
        self.store.size(path.as_str()).await
    }

    /// Remove a session: its directory (target object included) and any
    /// fragments still waiting to be merged
    #[instrument(skip_all, fields(session = tracing::field::Empty))]
    pub async fn delete_session(&self, identity: Option<&str>) -> UploadResult<()> {
        let path = self.resolve(identity)?;
        tracing::Span::current().record("session", path.file_name());

        if !self.store.delete_directory(path.parent()).await? {
            return Err(UploadError::storage("session directory was not removed"));
        }
        if !self.merge.discard(&path).await? {
            warn!("fragment namespace was not removed");
        }

        info!("upload session deleted");
        Ok(())
    }

    /// Decode a client-presented identity into its storage path.
    ///
    /// Every decode failure becomes [`UploadError::InvalidIdentity`]; the
    /// underlying cause is neither returned nor logged.
    pub fn resolve(&self, identity: Option<&str>) -> UploadResult<SessionPath> {
        let identity = identity
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(UploadError::MissingIdentity)?;

        self.codec
            .decode(identity)
            .map(SessionPath::from_trusted)
            .map_err(|_| UploadError::InvalidIdentity)
    }

    fn derive_path(&self, filename: Option<&str>) -> SessionPath {
        SessionPath::derive(&self.config.temporary_files_path, &SessionToken::new(), filename)
    }

    fn encode(&self, path: &SessionPath) -> UploadResult<EncodedIdentity> {
        self.codec
            .encode(path.as_str())
            .map_err(|e| UploadError::config(e.to_string()))
    }
}
