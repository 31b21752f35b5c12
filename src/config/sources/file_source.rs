//! Async file-based config source with SHA256 change detection.
//!
//! [`FileSource`] implements [`ConfigSource`] for every supported file
//! format. The format is picked from the file extension when the source
//! is created. Each load reads the file through Tokio, applies the JWT
//! secret override (if any), validates the result, and hashes the raw
//! content for version tracking.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{parse_config_str, sha256_hex};
use crate::config::model::GatewayConfig;
use crate::config::validation::validate;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::GatewayError;

pub struct FileSource {
    path: PathBuf,
    ext: &'static str,
    jwt_secret: Option<String>,
}

impl FileSource {
    /// Create a source for `path`, rejecting extensions whose format
    /// feature is not compiled in.
    pub fn new(path: &Path) -> Result<Self, GatewayError> {
        let ext = match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => "yaml",

            #[cfg(feature = "json")]
            "json" => "json",

            other => return Err(GatewayError::UnsupportedFormat(other.to_string())),
        };

        Ok(Self {
            path: path.to_path_buf(),
            ext,
            jwt_secret: None,
        })
    }

    /// Replace `jwt.secret` from the file with `secret` on every load.
    /// Applied before validation, so the file may omit the secret.
    #[must_use]
    pub fn with_jwt_secret(mut self, secret: Option<String>) -> Self {
        self.jwt_secret = secret.filter(|s| !s.is_empty());
        self
    }

    async fn read_content(&self) -> Result<String, GatewayError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GatewayError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                GatewayError::Io(e)
            }
        })
    }
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("path", &self.path)
            .field("ext", &self.ext)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.ext
    }

    async fn load(&self) -> Result<(GatewayConfig, ConfigVersion), GatewayError> {
        let content = self.read_content().await?;

        let mut config = parse_config_str(self.ext, &content, &self.path.display().to_string())?;
        if let Some(ref secret) = self.jwt_secret {
            config.jwt.secret.clone_from(secret);
        }

        if let Err(errors) = validate(&config) {
            return Err(GatewayError::ConfigValidation { errors });
        }

        let hash = sha256_hex(content.as_bytes());
        Ok((config, ConfigVersion::Hash(hash)))
    }

    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, GatewayError> {
        let content = self.read_content().await?;
        let hash = sha256_hex(content.as_bytes());
        Ok(*current != ConfigVersion::Hash(hash))
    }
}
