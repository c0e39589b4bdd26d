//! dog-upload-axum: Axum adapter for dog-upload.
//!
//! Exposes an [`UploadSessionController`] as the FilePond server protocol on
//! `/upload` and wires the disks a deployment configures through the
//! `DOG_UPLOAD__*` environment.

pub mod app;
pub mod config;
pub mod params;
pub mod rest;
pub mod state;
mod error;
pub use error::UploadHttpError;
pub use state::UploadState;

pub use app::{axum, UploadApp};
pub use config::ServerConfig;

use anyhow::Context;
use dog_upload::{DiskRegistry, IdentityCodec, LocalStore, S3Config, S3Store, UploadConfig, UploadSessionController};

/// Environment variable holding the base64 identity key
pub const APP_KEY_VAR: &str = "DOG_UPLOAD__APP_KEY";

/// Build the app from the process environment.
///
/// Registers a `local` disk rooted at `server.local_root` and, when
/// `DOG_UPLOAD__S3_BUCKET` is set, an `s3` disk.
pub async fn build(server: &ServerConfig) -> anyhow::Result<UploadApp> {
    let config = UploadConfig::from_env()?;
    let key = std::env::var(APP_KEY_VAR).with_context(|| format!("{APP_KEY_VAR} must be set"))?;
    let codec = IdentityCodec::from_base64_key(&key).with_context(|| format!("{APP_KEY_VAR} is not a valid key"))?;

    let mut local = LocalStore::new(&server.local_root);
    if server.local_append {
        local = local.with_native_append();
    }
    let mut disks = DiskRegistry::new().with_disk("local", local);

    if std::env::var("DOG_UPLOAD__S3_BUCKET").is_ok() {
        let s3 = S3Store::new(S3Config::from_env()?).await;
        disks = disks.with_disk("s3", s3);
    }

    tracing::info!(
        disk = %config.temporary_files_disk,
        disks = ?disks.names().collect::<Vec<_>>(),
        "upload disks registered"
    );

    let uploads = UploadSessionController::new(config, codec, &disks)?;
    Ok(UploadApp::with_body_limit(uploads, server.body_limit))
}
