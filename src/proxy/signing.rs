//! Outbound request signing for tenants with a webhook secret.
//!
//! The signature is a short-lived HS256 JWT whose `sha256` claim is the
//! hex digest of the forwarded body, letting the receiver check both the
//! sender and the payload.

use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::config::sources::sha256_hex;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
const ISSUER: &str = "gatehouse";
const SIGNATURE_TTL_SECS: u64 = 300;

#[derive(Debug, Serialize, Deserialize)]
pub struct SignatureClaims {
    pub iss: String,
    pub sha256: String,
    pub request_id: String,
    pub iat: u64,
    pub exp: u64,
}

pub fn sign_payload(
    secret: &str,
    body: &[u8],
    request_id: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let iat = get_current_timestamp();
    let claims = SignatureClaims {
        iss: ISSUER.to_string(),
        sha256: sha256_hex(body),
        request_id: request_id.to_string(),
        iat,
        exp: iat + SIGNATURE_TTL_SECS,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
