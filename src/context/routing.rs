//! Upstream target binding.

use std::sync::Arc;

use url::Url;

use super::{Binding, RequestContext, Slot};

impl RequestContext {
    /// Bind the upstream URL this request is forwarded to. The URL is
    /// expected to be absolute; it is stored as given.
    #[must_use]
    pub fn bind_proxy_target(&self, target: Url) -> Self {
        self.derive(Binding::ProxyTarget(Arc::new(target)))
    }

    #[must_use]
    pub fn proxy_target(&self) -> Option<&Url> {
        match self.lookup(Slot::ProxyTarget)? {
            Binding::ProxyTarget(url) => Some(url),
            _ => None,
        }
    }
}
