//! AnthropicAdapter -- [`BackendAdapter`] for the Anthropic Messages API.
//!
//! Renders nothing itself: the prompt arrives already formatted for the
//! `Tagged` family. The adapter wraps it in a Messages request, sends it
//! with the proper authentication headers, and maps the reply to an
//! [`AttemptOutcome`].
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use plotline_core::llm::adapter::BackendAdapter;
use plotline_core::llm::refusal::detect_refusal;
use plotline_core::prompt::FormattedPrompt;
use plotline_types::error::AdapterBuildError;
use plotline_types::generation::BackendDescriptor;
use plotline_types::outcome::AttemptOutcome;

use super::types::{AnthropicMessage, AnthropicRequest, AnthropicResponse};
use crate::llm::http::{build_client, send_json};

/// Anthropic Claude backend adapter.
///
/// Does not derive Debug, so the key never shows up in formatted output.
pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl AnthropicAdapter {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";

    pub fn new(api_key: SecretString, timeout: Duration) -> Result<Self, AdapterBuildError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Override the base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn to_anthropic_request(prompt: &FormattedPrompt, descriptor: &BackendDescriptor) -> AnthropicRequest {
        AnthropicRequest {
            model: descriptor.model.clone(),
            max_tokens: descriptor.max_output_tokens,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.user.clone(),
            }],
            system: (!prompt.system.is_empty()).then(|| prompt.system.clone()),
        }
    }

    /// Classify a decoded response.
    fn interpret(response: AnthropicResponse) -> AttemptOutcome {
        let text = response.text();
        tracing::debug!(
            id = %response.id,
            model = %response.model,
            stop_reason = ?response.stop_reason,
            output_tokens = response.usage.output_tokens,
            "Anthropic response"
        );

        if response.stop_reason.as_deref() == Some("refusal") {
            let reason = detect_refusal(&text).unwrap_or_else(|| "stop_reason: refusal".to_string());
            return AttemptOutcome::refused(reason);
        }
        if let Some(reason) = detect_refusal(&text) {
            return AttemptOutcome::refused(reason);
        }
        AttemptOutcome::Success { raw_text: text }
    }
}

impl BackendAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn invoke(&self, prompt: &FormattedPrompt, descriptor: &BackendDescriptor) -> AttemptOutcome {
        let body = Self::to_anthropic_request(prompt, descriptor);
        let request = self
            .client
            .post(self.url("/v1/messages"))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION);

        match send_json::<_, AnthropicResponse>(request, &body).await {
            Ok(response) => Self::interpret(response),
            Err(outcome) => outcome,
        }
    }
}
