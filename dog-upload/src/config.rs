use std::path::PathBuf;

use crate::{UploadError, UploadResult};

/// Environment prefix for configuration overrides (`DOG_UPLOAD__CHUNKS_PATH`, ...)
pub const ENV_PREFIX: &str = "DOG_UPLOAD__";

/// Default ceiling for a single native append operation (4 MiB)
pub const DEFAULT_MAX_APPEND_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Configuration for upload sessions.
///
/// Built once at startup and handed to every component by value; nothing
/// reads configuration lazily after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Root namespace for session objects
    pub temporary_files_path: String,

    /// Name of the disk (see [`crate::DiskRegistry`]) that holds sessions
    pub temporary_files_disk: String,

    /// Root namespace for merge-strategy fragment objects
    pub chunks_path: String,

    /// Form field carrying the file on simple uploads
    pub input_name: String,

    /// Largest payload a single native append call may carry
    pub max_append_block_size: u64,

    /// Local directory for merge staging files; `None` means the OS temp dir
    pub staging_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            temporary_files_path: "filepond".to_string(),
            temporary_files_disk: "local".to_string(),
            chunks_path: "filepond/chunks".to_string(),
            input_name: "file".to_string(),
            max_append_block_size: DEFAULT_MAX_APPEND_BLOCK_SIZE,
            staging_dir: None,
        }
    }
}

impl UploadConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `DOG_UPLOAD__*` environment variables
    pub fn from_env() -> UploadResult<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Defaults overlaid with `DOG_UPLOAD__*` pairs from any source.
    ///
    /// Unknown keys are ignored so the same prefix can carry server settings.
    pub fn from_vars<I, K, V>(vars: I) -> UploadResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let Some(field) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.into();

            match field.to_lowercase().as_str() {
                "temporary_files_path" => config.temporary_files_path = trim_namespace(&value),
                "temporary_files_disk" => config.temporary_files_disk = value,
                "chunks_path" => config.chunks_path = trim_namespace(&value),
                "input_name" => config.input_name = value,
                "max_append_block_size" => {
                    let size = value.parse::<u64>().map_err(|_| {
                        UploadError::config(format!(
                            "max_append_block_size must be a positive integer, got {:?}",
                            value
                        ))
                    })?;
                    config = config.with_max_append_block_size(size)?;
                }
                "staging_dir" => config.staging_dir = Some(PathBuf::from(value)),
                _ => {}
            }
        }

        Ok(config)
    }

    /// Set the session root namespace
    pub fn with_temporary_files_path<S: Into<String>>(mut self, path: S) -> Self {
        self.temporary_files_path = trim_namespace(&path.into());
        self
    }

    /// Set the disk that holds sessions
    pub fn with_temporary_files_disk<S: Into<String>>(mut self, disk: S) -> Self {
        self.temporary_files_disk = disk.into();
        self
    }

    /// Set the fragment root namespace
    pub fn with_chunks_path<S: Into<String>>(mut self, path: S) -> Self {
        self.chunks_path = trim_namespace(&path.into());
        self
    }

    /// Set the simple-upload form field name
    pub fn with_input_name<S: Into<String>>(mut self, name: S) -> Self {
        self.input_name = name.into();
        self
    }

    /// Set the native append ceiling; zero is rejected
    pub fn with_max_append_block_size(mut self, bytes: u64) -> UploadResult<Self> {
        if bytes == 0 {
            return Err(UploadError::config("max_append_block_size must be greater than zero"));
        }
        self.max_append_block_size = bytes;
        Ok(self)
    }

    /// Set the local staging directory used while merging fragments
    pub fn with_staging_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Directory merge staging files are created in
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn trim_namespace(path: &str) -> String {
    path.trim_matches('/').to_string()
}
