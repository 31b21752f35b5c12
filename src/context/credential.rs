//! Credential pool binding and per-request credential selection.
//!
//! A tenant may configure several equivalent upstream tokens as one
//! comma-delimited string. Spreading calls across them keeps a single
//! token from exhausting the provider's rate limit.
//!
//! [`select_credential`](RequestContext::select_credential) draws fresh on
//! every call. The forwarding stage calls
//! [`pin_credential`](RequestContext::pin_credential) once and reads
//! [`credential`](RequestContext::credential) afterwards, so one request
//! never mixes tokens.

use std::sync::Arc;

use rand::seq::SliceRandom;

use super::{Binding, RequestContext, Slot};

const POOL_DELIMITER: char = ',';

/// Split a raw pool string into its non-empty, trimmed tokens.
#[must_use]
pub fn split_pool(pool: &str) -> Vec<&str> {
    pool.split(POOL_DELIMITER)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

impl RequestContext {
    /// Store the raw pool string verbatim. Token shape is not validated.
    #[must_use]
    pub fn bind_credential_pool(&self, pool: impl Into<Arc<str>>) -> Self {
        self.derive(Binding::CredentialPool(pool.into()))
    }

    #[must_use]
    pub fn credential_pool(&self) -> Option<&str> {
        self.lookup_str(Slot::CredentialPool)
    }

    /// Pick one token uniformly at random from the bound pool.
    ///
    /// Returns `""` when the pool is absent or holds no tokens.
    #[must_use]
    pub fn select_credential(&self) -> String {
        let Some(pool) = self.credential_pool() else {
            return String::new();
        };
        split_pool(pool)
            .choose(&mut rand::thread_rng())
            .map_or_else(String::new, |token| (*token).to_string())
    }

    /// Select once and bind the result as this request's credential.
    ///
    /// A credential pinned after the nearest pool binding is kept; a pool
    /// rebound since the last pin gets a fresh selection. An empty
    /// selection binds nothing, leaving [`credential`](Self::credential)
    /// at `""`.
    #[must_use]
    pub fn pin_credential(&self) -> Self {
        if self.current_pin().is_some() {
            return self.clone();
        }
        let selected = self.select_credential();
        if selected.is_empty() {
            return self.clone();
        }
        self.derive(Binding::SelectedCredential(selected.into()))
    }

    /// The pinned credential, or `""` when none was pinned against the
    /// currently bound pool.
    #[must_use]
    pub fn credential(&self) -> &str {
        self.current_pin().unwrap_or_default()
    }

    // A pin only counts while no newer pool shadows the one it came from.
    fn current_pin(&self) -> Option<&str> {
        match self.lookup_nearest(&[Slot::SelectedCredential, Slot::CredentialPool])? {
            Binding::SelectedCredential(token) => Some(token),
            _ => None,
        }
    }
}
