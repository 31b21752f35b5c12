//! Bearer token extraction and HS256 JWT verification.
//!
//! [`JwtVerifier`] is built once per loaded config and checks the
//! signature, expiry, and (optionally) audience of the caller's token.
//! The resulting [`Claims`] are what the identity stage binds into the
//! request context.

use axum::http::HeaderMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::model::JwtSettings;
use crate::error::ProxyError;

/// Claims carried by a gateway access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Tenant this token grants access to.
    pub instance_id: String,

    #[serde(default)]
    pub roles: Vec<String>,

    pub exp: u64,
}

impl Claims {
    /// True when the instance allows any caller, or the caller holds one
    /// of the allowed roles.
    #[must_use]
    pub fn has_any_role(&self, allowed: &[String]) -> bool {
        allowed.is_empty() || self.roles.iter().any(|r| allowed.contains(r))
    }
}

pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    #[must_use]
    pub fn new(settings: &JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match settings.audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ProxyError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::InvalidToken => "invalid token format",
                    ErrorKind::InvalidSignature => "invalid signature",
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidAudience => "invalid audience",
                    ErrorKind::ImmatureSignature => "token not yet valid",
                    ErrorKind::MissingRequiredClaim(_) | ErrorKind::Json(_) => {
                        "missing or malformed claims"
                    }
                    _ => "invalid token",
                };
                ProxyError::InvalidToken(reason)
            })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
