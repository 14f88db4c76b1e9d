//! OpenAI-compatible backend (Markdown prompt family).
//!
//! One [`OpenAiCompatibleAdapter`] serves OpenAI and any provider exposing
//! the Chat Completions endpoint (Gemini, Mistral, vLLM, LM Studio, ...)
//! via a configurable base URL.

pub mod types;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use plotline_core::llm::adapter::BackendAdapter;
use plotline_core::llm::refusal::detect_refusal;
use plotline_core::prompt::FormattedPrompt;
use plotline_types::error::AdapterBuildError;
use plotline_types::generation::BackendDescriptor;
use plotline_types::outcome::AttemptOutcome;

use self::types::{ChatMessage, ChatRequest, ChatResponse};
use crate::llm::http::{build_client, send_json};

/// Adapter for any Chat Completions API.
///
/// Does not derive Debug to keep the bearer token out of formatted output.
pub struct OpenAiCompatibleAdapter {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl OpenAiCompatibleAdapter {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn new(
        api_key: SecretString,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, AdapterBuildError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: base_url
                .unwrap_or(Self::DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(prompt: &FormattedPrompt, descriptor: &BackendDescriptor) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: prompt.system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.user.clone(),
        });

        ChatRequest {
            model: descriptor.model.clone(),
            messages,
            max_tokens: descriptor.max_output_tokens,
        }
    }

    fn interpret(response: ChatResponse) -> AttemptOutcome {
        let Some(choice) = response.choices.into_iter().next() else {
            return AttemptOutcome::malformed("", "response contained no choices");
        };
        tracing::debug!(
            id = ?response.id,
            finish_reason = ?choice.finish_reason,
            "Chat completion response"
        );

        if let Some(refusal) = choice.message.refusal {
            return AttemptOutcome::refused(refusal);
        }
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return AttemptOutcome::refused("finish_reason: content_filter");
        }

        let text = choice.message.content.unwrap_or_default();
        match detect_refusal(&text) {
            Some(reason) => AttemptOutcome::refused(reason),
            None => AttemptOutcome::Success { raw_text: text },
        }
    }
}

impl BackendAdapter for OpenAiCompatibleAdapter {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    async fn invoke(&self, prompt: &FormattedPrompt, descriptor: &BackendDescriptor) -> AttemptOutcome {
        let body = Self::build_request(prompt, descriptor);
        let request = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret());

        match send_json::<_, ChatResponse>(request, &body).await {
            Ok(response) => Self::interpret(response),
            Err(outcome) => outcome,
        }
    }
}
