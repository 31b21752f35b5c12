//! Request-scoped, append-only context carrier.
//!
//! A [`RequestContext`] is a persistent chain of typed bindings. Each
//! [`derive`](RequestContext::derive) call returns a new handle whose head
//! node holds one [`Binding`] and points at the previous chain, so handles
//! obtained earlier never observe later bindings. Nodes are `Arc`-shared,
//! which makes handles cheap to clone and safe to read from many tasks.
//!
//! The typed bind/read pairs live in the submodules, one per pipeline
//! stage:
//!
//! - [`identity`] -- verified claims, request ID, site ID.
//! - [`tenant`] -- instance ID, instance record, resolved tenant config.
//! - [`credential`] -- credential pool and random per-request selection.
//! - [`routing`] -- upstream proxy target.
//! - [`signature`] -- precomputed outbound signature.

pub mod credential;
pub mod identity;
pub mod routing;
pub mod signature;
pub mod tenant;

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::auth::Claims;
use crate::config::model::{Instance, TenantConfig};

/// The closed set of slots a context can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Claims,
    RequestId,
    SiteId,
    InstanceId,
    Instance,
    Config,
    CredentialPool,
    SelectedCredential,
    ProxyTarget,
    Signature,
}

/// A single typed value bound to its slot.
#[derive(Debug, Clone)]
pub enum Binding {
    Claims(Arc<Claims>),
    RequestId(Arc<str>),
    SiteId(Arc<str>),
    InstanceId(Arc<str>),
    Instance(Arc<Instance>),
    Config(Arc<TenantConfig>),
    CredentialPool(Arc<str>),
    SelectedCredential(Arc<str>),
    ProxyTarget(Arc<Url>),
    Signature(Arc<str>),
}

impl Binding {
    #[must_use]
    pub const fn slot(&self) -> Slot {
        match self {
            Self::Claims(_) => Slot::Claims,
            Self::RequestId(_) => Slot::RequestId,
            Self::SiteId(_) => Slot::SiteId,
            Self::InstanceId(_) => Slot::InstanceId,
            Self::Instance(_) => Slot::Instance,
            Self::Config(_) => Slot::Config,
            Self::CredentialPool(_) => Slot::CredentialPool,
            Self::SelectedCredential(_) => Slot::SelectedCredential,
            Self::ProxyTarget(_) => Slot::ProxyTarget,
            Self::Signature(_) => Slot::Signature,
        }
    }
}

struct Node {
    binding: Binding,
    parent: Option<Arc<Node>>,
}

/// Immutable handle onto a chain of bindings for one request.
///
/// The default value is the empty root: every lookup is absent.
#[derive(Clone, Default)]
pub struct RequestContext {
    head: Option<Arc<Node>>,
}

impl RequestContext {
    /// Create an empty root context.
    #[must_use]
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Return a new handle that resolves `binding`'s slot to `binding` and
    /// delegates every other slot to `self`. `self` is left untouched.
    #[must_use]
    pub fn derive(&self, binding: Binding) -> Self {
        Self {
            head: Some(Arc::new(Node {
                binding,
                parent: self.head.clone(),
            })),
        }
    }

    /// Resolve the nearest binding for `slot`, walking toward the root.
    #[must_use]
    pub fn lookup(&self, slot: Slot) -> Option<&Binding> {
        let mut cursor = self.head.as_deref();
        while let Some(node) = cursor {
            if node.binding.slot() == slot {
                return Some(&node.binding);
            }
            cursor = node.parent.as_deref();
        }
        None
    }

    /// Number of bindings in the chain, including shadowed ones.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.head.as_deref();
        while let Some(node) = cursor {
            depth += 1;
            cursor = node.parent.as_deref();
        }
        depth
    }

    /// Nearest binding whose slot is any of `slots`.
    fn lookup_nearest(&self, slots: &[Slot]) -> Option<&Binding> {
        let mut cursor = self.head.as_deref();
        while let Some(node) = cursor {
            if slots.contains(&node.binding.slot()) {
                return Some(&node.binding);
            }
            cursor = node.parent.as_deref();
        }
        None
    }

    fn lookup_str(&self, slot: Slot) -> Option<&str> {
        match self.lookup(slot)? {
            Binding::RequestId(s)
            | Binding::SiteId(s)
            | Binding::InstanceId(s)
            | Binding::CredentialPool(s)
            | Binding::SelectedCredential(s)
            | Binding::Signature(s) => Some(s),
            _ => None,
        }
    }
}

// Values like the credential pool and signature must never reach logs, so
// Debug only reports which slots are bound.
impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut slots = Vec::new();
        let mut cursor = self.head.as_deref();
        while let Some(node) = cursor {
            slots.push(node.binding.slot());
            cursor = node.parent.as_deref();
        }
        f.debug_struct("RequestContext")
            .field("slots", &slots)
            .finish()
    }
}

impl Drop for RequestContext {
    // Unlink uniquely-owned nodes iteratively so long chains cannot
    // overflow the stack through recursive Arc drops.
    fn drop(&mut self) {
        let mut cursor = self.head.take();
        while let Some(node) = cursor {
            match Arc::try_unwrap(node) {
                Ok(mut owned) => cursor = owned.parent.take(),
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_id(value: &str) -> Binding {
        Binding::RequestId(Arc::from(value))
    }

    #[test]
    fn empty_root_has_no_bindings() {
        let ctx = RequestContext::new();
        assert!(ctx.lookup(Slot::RequestId).is_none());
        assert!(ctx.lookup(Slot::Claims).is_none());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn derive_resolves_new_binding() {
        let ctx = RequestContext::new().derive(request_id("abc"));
        assert!(matches!(
            ctx.lookup(Slot::RequestId),
            Some(Binding::RequestId(id)) if &**id == "abc"
        ));
    }

    #[test]
    fn nearest_binding_wins() {
        let ctx = RequestContext::new()
            .derive(request_id("first"))
            .derive(Binding::Signature(Arc::from("sig")))
            .derive(request_id("second"));
        assert_eq!(ctx.lookup_str(Slot::RequestId), Some("second"));
        assert_eq!(ctx.lookup_str(Slot::Signature), Some("sig"));
        assert_eq!(ctx.depth(), 3);
    }

    #[test]
    fn derive_leaves_parent_untouched() {
        let parent = RequestContext::new().derive(request_id("parent"));
        let child = parent.derive(request_id("child"));
        assert_eq!(parent.lookup_str(Slot::RequestId), Some("parent"));
        assert_eq!(child.lookup_str(Slot::RequestId), Some("child"));
    }

    #[test]
    fn debug_hides_values() {
        let ctx = RequestContext::new().derive(Binding::CredentialPool(Arc::from("secret-token")));
        let rendered = format!("{ctx:?}");
        assert!(rendered.contains("CredentialPool"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn long_chain_drops_without_overflow() {
        let mut ctx = RequestContext::new();
        for i in 0..200_000 {
            ctx = ctx.derive(request_id(&i.to_string()));
        }
        assert_eq!(ctx.lookup_str(Slot::RequestId), Some("199999"));
        drop(ctx);
    }
}
