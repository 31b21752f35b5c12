//! Concrete [`ConfigSource`](super::ConfigSource) implementations.
//!
//! Provides the file-based [`FileSource`](file_source::FileSource) for
//! YAML and JSON (gated by feature flags) and the [`parse_config_str`]
//! helper for format-specific deserialization.

pub mod file_source;

use sha2::{Digest, Sha256};

use crate::config::model::GatewayConfig;
use crate::error::GatewayError;

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<GatewayConfig, GatewayError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| GatewayError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| GatewayError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(GatewayError::UnsupportedFormat(other.to_string())),
    }
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
