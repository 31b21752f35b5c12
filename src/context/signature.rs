//! Outbound signature binding.

use std::sync::Arc;

use super::{Binding, RequestContext, Slot};

impl RequestContext {
    /// Bind an already computed signature for the outbound call.
    #[must_use]
    pub fn bind_signature(&self, signature: impl Into<Arc<str>>) -> Self {
        self.derive(Binding::Signature(signature.into()))
    }

    /// The bound signature, or `""` when the request is unsigned.
    #[must_use]
    pub fn signature(&self) -> &str {
        self.lookup_str(Slot::Signature).unwrap_or_default()
    }
}
