//! Backend adapter implementations.
//!
//! Contains concrete implementations of the
//! [`BackendAdapter`](plotline_core::llm::adapter::BackendAdapter) trait
//! defined in `plotline-core`, one per wire protocol.
//!
//! Also provides an adapter factory ([`create_adapter`]) that constructs the
//! right adapter from a [`BackendConfig`], and [`build_registry`] which turns
//! a whole [`PlotlineConfig`] plus environment credentials into a
//! [`BackendRegistry`].

pub mod anthropic;
pub mod http;
pub mod ollama;
pub mod openai_compat;

use std::time::Duration;

use secrecy::SecretString;

use plotline_core::llm::box_adapter::BoxBackendAdapter;
use plotline_core::llm::registry::BackendRegistry;
use plotline_types::config::{BackendConfig, BackendKind, PlotlineConfig};
use plotline_types::error::{AdapterBuildError, ConfigError};

use self::anthropic::AnthropicAdapter;
use self::ollama::OllamaAdapter;
use self::openai_compat::OpenAiCompatibleAdapter;

/// Create a [`BoxBackendAdapter`] from a [`BackendConfig`].
///
/// `credential` is the value of the backend's `credential_env` variable:
/// the API key for hosted kinds, the server URL for Ollama. An Ollama
/// backend with a configured `base_url` needs no credential.
///
/// # Errors
///
/// Returns an error if the backend has neither credential nor (for Ollama)
/// a configured `base_url`, or the HTTP client cannot be built.
pub fn create_adapter(
    config: &BackendConfig,
    credential: Option<&str>,
    timeout: Duration,
) -> Result<BoxBackendAdapter, AdapterBuildError> {
    let missing = || AdapterBuildError::MissingCredential(config.credential_env.clone());

    match config.kind {
        BackendKind::Anthropic => {
            let key = credential.ok_or_else(missing)?;
            let mut adapter = AnthropicAdapter::new(SecretString::from(key.to_string()), timeout)?;
            if let Some(base_url) = config.base_url.as_deref() {
                adapter = adapter.with_base_url(base_url);
            }
            Ok(BoxBackendAdapter::new(adapter))
        }
        BackendKind::OpenAiCompatible => {
            let key = credential.ok_or_else(missing)?;
            let adapter = OpenAiCompatibleAdapter::new(
                SecretString::from(key.to_string()),
                config.base_url.as_deref(),
                timeout,
            )?;
            Ok(BoxBackendAdapter::new(adapter))
        }
        BackendKind::Ollama => {
            let base_url = config.base_url.as_deref().or(credential).ok_or_else(missing)?;
            Ok(BoxBackendAdapter::new(OllamaAdapter::new(Some(base_url), timeout)?))
        }
    }
}

/// Whether a backend can be registered with the given environment.
pub fn has_credential(config: &BackendConfig, env: &impl Fn(&str) -> Option<String>) -> bool {
    let from_env = env(config.credential_env.as_str()).is_some_and(|v| !v.trim().is_empty());
    match config.kind {
        BackendKind::Ollama => from_env || config.base_url.is_some(),
        BackendKind::Anthropic | BackendKind::OpenAiCompatible => from_env,
    }
}

/// A configured backend left out of the registry, and why.
#[derive(Debug)]
pub struct SkippedBackend {
    pub identifier: String,
    pub reason: AdapterBuildError,
}

/// Build the registry from configuration, reading credentials through `env`.
///
/// Backends whose adapter cannot be built (usually a missing credential) are
/// skipped and reported, not treated as errors: an empty registry is valid
/// and sends every request to manual fallback.
///
/// # Errors
///
/// Returns a [`ConfigError`] for duplicate identifiers or zero capacities.
pub fn build_registry(
    config: &PlotlineConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(BackendRegistry, Vec<SkippedBackend>), ConfigError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let mut builder = BackendRegistry::builder();
    let mut skipped = Vec::new();

    for backend in &config.backends {
        let credential = env(backend.credential_env.as_str()).filter(|v| !v.trim().is_empty());
        match create_adapter(backend, credential.as_deref(), timeout) {
            Ok(adapter) => {
                tracing::debug!(
                    backend = %backend.identifier,
                    kind = %backend.kind,
                    family = %backend.family(),
                    "Registered backend"
                );
                builder = builder.register(backend.descriptor(), adapter)?;
            }
            Err(reason) => {
                tracing::info!(backend = %backend.identifier, %reason, "Backend not registered");
                skipped.push(SkippedBackend {
                    identifier: backend.identifier.clone(),
                    reason,
                });
            }
        }
    }

    Ok((builder.build(), skipped))
}

/// Read a credential from the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
