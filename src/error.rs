//! Unified error types for gatehouse.
//!
//! Defines [`GatewayError`] (startup, config, and CLI failures),
//! [`ValidationError`] for config validation failures, and [`ProxyError`]
//! for per-request failures in the gateway pipeline. All use `thiserror`
//! for `Display` and `Error` derives. [`ProxyError`] also renders itself as
//! an HTTP response tagged with the request ID.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub instance: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "  instance {}: {}: {}",
            self.instance, self.field, self.message
        )?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("No config source found.\n\n  {hint}")]
    NoConfigSource { hint: String },

    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// A request that could not be forwarded.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("{0}")]
    InvalidToken(&'static str),

    #[error("instance '{0}' is not configured")]
    UnknownInstance(String),

    #[error("token does not grant access to this instance")]
    Forbidden,

    #[error("no upstream route for this path")]
    NoRoute,

    #[error("no upstream credential available")]
    NoCredential,

    #[error("upstream request failed")]
    Upstream,

    #[error("upstream request timed out")]
    Timeout,

    #[error("internal gateway error")]
    Internal,
}

impl ProxyError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::UnknownInstance(_) | Self::NoRoute => StatusCode::NOT_FOUND,
            Self::NoCredential | Self::Upstream => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render with the request ID so callers can correlate with gateway logs.
    #[must_use]
    pub fn into_response_for(self, request_id: &str) -> Response {
        let status = self.status();
        let mut response = (
            status,
            Json(serde_json::json!({
                "error": self.to_string(),
                "request_id": request_id,
            })),
        )
            .into_response();
        if matches!(self, Self::MissingToken | Self::InvalidToken(_)) {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}
