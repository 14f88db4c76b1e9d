//! BoxBackendAdapter -- object-safe dynamic dispatch wrapper for BackendAdapter.
//!
//! 1. Define an object-safe `BackendAdapterDyn` trait with boxed futures
//! 2. Blanket-impl `BackendAdapterDyn` for all `T: BackendAdapter`
//! 3. `BoxBackendAdapter` wraps `Box<dyn BackendAdapterDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use plotline_types::generation::BackendDescriptor;
use plotline_types::outcome::AttemptOutcome;

use super::adapter::BackendAdapter;
use crate::prompt::FormattedPrompt;

/// Object-safe version of [`BackendAdapter`] with boxed futures.
pub trait BackendAdapterDyn: Send + Sync {
    fn name(&self) -> &str;

    fn invoke_boxed<'a>(
        &'a self,
        prompt: &'a FormattedPrompt,
        descriptor: &'a BackendDescriptor,
    ) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send + 'a>>;
}

impl<T: BackendAdapter> BackendAdapterDyn for T {
    fn name(&self) -> &str {
        BackendAdapter::name(self)
    }

    fn invoke_boxed<'a>(
        &'a self,
        prompt: &'a FormattedPrompt,
        descriptor: &'a BackendDescriptor,
    ) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send + 'a>> {
        Box::pin(self.invoke(prompt, descriptor))
    }
}

/// Type-erased backend adapter for runtime backend selection.
///
/// Since `BackendAdapter` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxBackendAdapter` provides the same method, delegating to the
/// inner `BackendAdapterDyn` trait object.
pub struct BoxBackendAdapter {
    inner: Box<dyn BackendAdapterDyn + Send + Sync>,
}

impl BoxBackendAdapter {
    /// Wrap a concrete `BackendAdapter` in a type-erased box.
    pub fn new<T: BackendAdapter + 'static>(adapter: T) -> Self {
        Self {
            inner: Box::new(adapter),
        }
    }

    /// Protocol name of the wrapped adapter.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Perform one call through the wrapped adapter.
    pub async fn invoke(
        &self,
        prompt: &FormattedPrompt,
        descriptor: &BackendDescriptor,
    ) -> AttemptOutcome {
        self.inner.invoke_boxed(prompt, descriptor).await
    }
}

impl std::fmt::Debug for BoxBackendAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxBackendAdapter")
            .field("name", &self.name())
            .finish()
    }
}
