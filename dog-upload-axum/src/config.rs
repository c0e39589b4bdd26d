use std::path::PathBuf;

use dog_upload::ENV_PREFIX;

use crate::app::DEFAULT_BODY_LIMIT;

/// Process-level settings for the upload server, read from the same
/// `DOG_UPLOAD__*` namespace as [`dog_upload::UploadConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root directory of the `local` disk
    pub local_root: PathBuf,
    /// Whether the `local` disk offers native append
    pub local_append: bool,
    /// Largest request body accepted (one fragment or one simple upload)
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3030,
            local_root: PathBuf::from("storage"),
            local_append: true,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> anyhow::Result<Self>
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
                "http_host" => config.host = value,
                "http_port" => {
                    config.port = value
                        .parse()
                        .map_err(|_| anyhow::anyhow!("http_port must be a port number, got {:?}", value))?
                }
                "local_root" => config.local_root = PathBuf::from(value),
                "local_append" => config.local_append = value == "true" || value == "1",
                "body_limit" => {
                    config.body_limit = value
                        .parse()
                        .map_err(|_| anyhow::anyhow!("body_limit must be a byte count, got {:?}", value))?
                }
                _ => {}
            }
        }

        Ok(config)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
