//! Backend registry for runtime backend lookup.
//!
//! The registry is built once at startup and never mutated afterwards, so
//! concurrent requests can share it behind an `Arc` without locking.

use plotline_types::error::ConfigError;
use plotline_types::generation::BackendDescriptor;

use super::box_adapter::BoxBackendAdapter;

/// One backend: its static capabilities and the adapter that reaches it.
#[derive(Debug)]
pub struct RegisteredBackend {
    pub descriptor: BackendDescriptor,
    pub adapter: BoxBackendAdapter,
}

/// Immutable set of registered backends in registration order.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: Vec<RegisteredBackend>,
}

impl BackendRegistry {
    /// A registry with no backends. Every request goes to manual fallback.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up a backend by identifier.
    pub fn get(&self, identifier: &str) -> Option<&RegisteredBackend> {
        self.backends
            .iter()
            .find(|b| b.descriptor.identifier == identifier)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.backends.iter().map(|b| &b.descriptor)
    }

    /// List all registered identifiers.
    pub fn list_identifiers(&self) -> Vec<&str> {
        self.descriptors().map(|d| d.identifier.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Accumulates backends before freezing them into a [`BackendRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    backends: Vec<RegisteredBackend>,
}

impl RegistryBuilder {
    /// Register a backend. Identifiers must be unique.
    pub fn register(
        mut self,
        descriptor: BackendDescriptor,
        adapter: BoxBackendAdapter,
    ) -> Result<Self, ConfigError> {
        if self
            .backends
            .iter()
            .any(|b| b.descriptor.identifier == descriptor.identifier)
        {
            return Err(ConfigError::DuplicateBackend(descriptor.identifier));
        }
        if descriptor.capacity_tokens == 0 {
            return Err(ConfigError::ZeroCapacity(descriptor.identifier));
        }
        tracing::debug!(
            backend = %descriptor.identifier,
            adapter = adapter.name(),
            "Registered backend"
        );
        self.backends.push(RegisteredBackend {
            descriptor,
            adapter,
        });
        Ok(self)
    }

    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            backends: self.backends,
        }
    }
}
