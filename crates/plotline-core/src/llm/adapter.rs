//! BackendAdapter trait definition.
//!
//! The boundary between the generation loop and a concrete model backend.
//! Uses RPITIT for `invoke`; see [`super::box_adapter`] for the object-safe
//! wrapper used by the registry.

use plotline_types::generation::BackendDescriptor;
use plotline_types::outcome::AttemptOutcome;

use crate::prompt::FormattedPrompt;

/// Trait for backend protocol clients (Anthropic, OpenAI-compatible, Ollama).
///
/// Implementations live in plotline-infra. Every failure path must resolve
/// to an [`AttemptOutcome`] variant: an adapter never panics or returns an
/// error past this boundary, applies its own network timeout, and never
/// retries internally. Retry policy belongs to the orchestrator.
pub trait BackendAdapter: Send + Sync {
    /// Protocol name (e.g., "anthropic", "ollama").
    fn name(&self) -> &str;

    /// Perform exactly one outbound call and classify its result.
    fn invoke(
        &self,
        prompt: &FormattedPrompt,
        descriptor: &BackendDescriptor,
    ) -> impl std::future::Future<Output = AttemptOutcome> + Send;
}
