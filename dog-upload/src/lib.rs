//! # dog-upload: Resumable chunked uploads
//!
//! `dog-upload` reassembles files that clients send as a sequence of
//! byte-range fragments, possibly out of order and possibly retried, and
//! produces the final object exactly once.
//!
//! ## Key Features
//!
//! - **Two persistence strategies**: native append onto the final object for
//!   stores that support it, fragment-then-merge for every other store
//! - **Automatic fallback**: any append failure re-ingests the same fragment
//!   through the order-tolerant merge path
//! - **Stateless**: all session state lives in the store; the client carries
//!   an authenticated, encrypted identity for its session
//! - **Streaming merge**: fragments are streamed through a local staging
//!   file, never buffered whole in memory
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use dog_upload::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> UploadResult<()> {
//! let codec = IdentityCodec::new(&[42u8; 32]).expect("32-byte key");
//! let uploads = UploadSessionController::with_store(
//!     UploadConfig::default(),
//!     codec,
//!     Arc::new(MemoryStore::new()),
//! );
//!
//! // 1. Client asks for a session and gets back an opaque identity
//! let id = uploads.initialize_session(Some("hello.txt"), Some("text/plain")).await?;
//!
//! // 2. Fragments arrive in any order
//! uploads.handle_fragment(Some(id.as_str()), Some("6"), Some("11"), Bytes::from_static(b"world"), None).await?;
//! uploads.handle_fragment(Some(id.as_str()), Some("0"), Some("11"), Bytes::from_static(b"hello "), None).await?;
//!
//! // 3. The final object now holds all 11 bytes
//! assert_eq!(uploads.received_bytes(Some(id.as_str())).await?, 11);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │         UploadSessionController          │  ← init / fragment / delete
//! ├────────────────────┬─────────────────────┤
//! │   AppendBackend    │ FragmentMergeEngine │  ← strategies
//! ├────────────────────┴─────────────────────┤
//! │     ChunkStore (+ NativeAppendStore)     │  ← storage primitives
//! └──────────────────────────────────────────┘
//! ```

mod append;
mod config;
mod controller;
mod error;
mod identity;
mod merge;
pub mod store;
pub mod stores;
mod types;

pub use append::AppendBackend;
pub use config::{UploadConfig, DEFAULT_MAX_APPEND_BLOCK_SIZE, ENV_PREFIX};
pub use controller::UploadSessionController;
pub use error::{UploadError, UploadResult};
pub use identity::{IdentityCodec, IdentityError};
pub use merge::{FragmentMergeEngine, MergeStatus};
pub use store::{ChunkStore, DiskRegistry, NativeAppendStore, PutResult};
pub use stores::{LocalStore, MemoryStore, S3Config, S3Store};
pub use types::{
    bytes_stream, AppendOutcome, ByteStream, EncodedIdentity, FragmentRange, SessionPath, SessionToken,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ChunkStore, DiskRegistry, EncodedIdentity, IdentityCodec, LocalStore, MemoryStore, UploadConfig,
        UploadError, UploadResult, UploadSessionController,
    };
}
