//! Serde data structures for the gatehouse configuration file.
//!
//! Contains [`GatewayConfig`] (the root), [`JwtSettings`], [`Defaults`],
//! and the per-tenant [`Instance`] records. All types derive `Serialize`
//! and `Deserialize` with `deny_unknown_fields` for strict parsing.
//!
//! [`Instance::resolve`] folds the gateway defaults into an instance to
//! produce the [`TenantConfig`] a request is served with.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::context::credential::split_pool;

const fn default_timeout() -> u64 {
    5000
}

const fn default_true() -> bool {
    true
}

fn is_default_timeout(v: &u64) -> bool {
    *v == default_timeout()
}

fn is_true(v: &bool) -> bool {
    *v
}

fn is_default_defaults(v: &Defaults) -> bool {
    v.timeout == default_timeout() && v.forward_headers
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub jwt: JwtSettings,

    #[serde(default, skip_serializing_if = "is_default_defaults")]
    pub defaults: Defaults,

    pub instances: Vec<Instance>,
}

impl GatewayConfig {
    #[must_use]
    pub fn find_instance(&self, id: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.id == id)
    }
}

#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JwtSettings {
    #[serde(default)]
    pub secret: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(
        default = "default_timeout",
        skip_serializing_if = "is_default_timeout"
    )]
    pub timeout: u64,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub forward_headers: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            forward_headers: default_true(),
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Instance {
    pub id: String,

    /// First path segment that routes to this instance, e.g. `github`.
    pub provider: String,

    /// Upstream base URL the remaining path is appended to.
    pub endpoint: String,

    /// Comma-delimited pool of equivalent upstream tokens.
    #[serde(default)]
    pub access_tokens: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

fn redacted<T>(value: Option<&T>) -> Option<&'static str> {
    value.map(|_| "<redacted>")
}

/// Renders a credential pool as its token count only.
struct RedactedPool<'a>(&'a str);

impl fmt::Debug for RedactedPool<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} redacted>", split_pool(self.0).len())
    }
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &redacted(Some(&self.secret).filter(|s| !s.is_empty())))
            .field("audience", &self.audience)
            .finish()
    }
}

// Tokens and the webhook secret are reduced to a count and a presence flag.
impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("access_tokens", &RedactedPool(&self.access_tokens))
            .field("roles", &self.roles)
            .field("webhook_secret", &redacted(self.webhook_secret.as_ref()))
            .field("site_id", &self.site_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Instance {
    pub fn resolve(&self, defaults: &Defaults) -> Result<TenantConfig, url::ParseError> {
        Ok(TenantConfig {
            provider: self.provider.clone(),
            endpoint: Url::parse(&self.endpoint)?,
            access_tokens: self.access_tokens.clone(),
            roles: self.roles.clone(),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            forward_headers: defaults.forward_headers,
        })
    }
}

/// Effective configuration for one request's tenant.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantConfig {
    pub provider: String,
    pub endpoint: Url,
    pub access_tokens: String,
    pub roles: Vec<String>,
    pub timeout: u64,
    pub forward_headers: bool,
}

impl fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint.as_str())
            .field("access_tokens", &RedactedPool(&self.access_tokens))
            .field("roles", &self.roles)
            .field("timeout", &self.timeout)
            .field("forward_headers", &self.forward_headers)
            .finish()
    }
}
