//! Tenant bindings: instance ID, instance record, and resolved config.

use std::sync::Arc;

use super::{Binding, RequestContext, Slot};
use crate::config::model::{Instance, TenantConfig};

impl RequestContext {
    #[must_use]
    pub fn bind_instance_id(&self, id: impl Into<Arc<str>>) -> Self {
        self.derive(Binding::InstanceId(id.into()))
    }

    /// `Some("")` is a bound-but-empty ID and is distinct from `None`.
    #[must_use]
    pub fn instance_id(&self) -> Option<&str> {
        self.lookup_str(Slot::InstanceId)
    }

    #[must_use]
    pub fn bind_instance(&self, instance: Arc<Instance>) -> Self {
        self.derive(Binding::Instance(instance))
    }

    #[must_use]
    pub fn instance(&self) -> Option<&Instance> {
        match self.lookup(Slot::Instance)? {
            Binding::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    #[must_use]
    pub fn bind_config(&self, config: TenantConfig) -> Self {
        self.derive(Binding::Config(Arc::new(config)))
    }

    #[must_use]
    pub fn config(&self) -> Option<&TenantConfig> {
        match self.lookup(Slot::Config)? {
            Binding::Config(config) => Some(config),
            _ => None,
        }
    }
}
