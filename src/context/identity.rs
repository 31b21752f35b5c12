//! Identity bindings: verified claims, request ID, and site ID.

use std::sync::Arc;

use super::{Binding, RequestContext, Slot};
use crate::auth::Claims;

impl RequestContext {
    /// Bind the claims of a verified token.
    ///
    /// A second binding shadows the first. When the two disagree on subject
    /// or instance, the replacement is logged.
    #[must_use]
    pub fn bind_verified_token(&self, claims: Claims) -> Self {
        if let Some(previous) = self.claims() {
            if previous.sub != claims.sub || previous.instance_id != claims.instance_id {
                tracing::warn!(
                    request_id = %self.request_id(),
                    previous_sub = %previous.sub,
                    sub = %claims.sub,
                    "verified token rebound with a different identity"
                );
            }
        }
        self.derive(Binding::Claims(Arc::new(claims)))
    }

    /// Claims of the authenticated caller. `None` means unauthenticated.
    #[must_use]
    pub fn claims(&self) -> Option<&Claims> {
        match self.lookup(Slot::Claims)? {
            Binding::Claims(claims) => Some(claims),
            _ => None,
        }
    }

    #[must_use]
    pub fn bind_request_id(&self, id: impl Into<Arc<str>>) -> Self {
        self.derive(Binding::RequestId(id.into()))
    }

    /// Correlation ID for this request, or `""` when none was assigned.
    #[must_use]
    pub fn request_id(&self) -> &str {
        self.lookup_str(Slot::RequestId).unwrap_or_default()
    }

    #[must_use]
    pub fn bind_site_id(&self, id: impl Into<Arc<str>>) -> Self {
        self.derive(Binding::SiteId(id.into()))
    }

    /// Downstream site identifier of the tenant, or `""`.
    #[must_use]
    pub fn site_id(&self) -> &str {
        self.lookup_str(Slot::SiteId).unwrap_or_default()
    }
}
