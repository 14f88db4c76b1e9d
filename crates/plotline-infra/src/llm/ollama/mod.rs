//! Ollama backend (Plain prompt family) for locally hosted models.
//!
//! Uses the non-streaming `/api/generate` endpoint. No credential is
//! needed; the server URL comes from configuration or the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use plotline_core::llm::adapter::BackendAdapter;
use plotline_core::llm::refusal::detect_refusal;
use plotline_core::prompt::FormattedPrompt;
use plotline_types::error::AdapterBuildError;
use plotline_types::generation::BackendDescriptor;
use plotline_types::outcome::AttemptOutcome;

use crate::llm::http::{build_client, send_json};

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    num_ctx: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug)]
pub struct OllamaAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaAdapter {
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:11434";

    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self, AdapterBuildError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url
                .unwrap_or(Self::DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn build_request(prompt: &FormattedPrompt, descriptor: &BackendDescriptor) -> GenerateRequest {
        GenerateRequest {
            model: descriptor.model.clone(),
            prompt: prompt.user.clone(),
            system: (!prompt.system.is_empty()).then(|| prompt.system.clone()),
            stream: false,
            options: GenerateOptions {
                num_predict: descriptor.max_output_tokens,
                num_ctx: descriptor.capacity_tokens,
            },
        }
    }

    fn interpret(response: GenerateResponse) -> AttemptOutcome {
        tracing::debug!(done_reason = ?response.done_reason, "Ollama response");
        match detect_refusal(&response.response) {
            Some(reason) => AttemptOutcome::refused(reason),
            None => AttemptOutcome::Success {
                raw_text: response.response,
            },
        }
    }
}

impl BackendAdapter for OllamaAdapter {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn invoke(&self, prompt: &FormattedPrompt, descriptor: &BackendDescriptor) -> AttemptOutcome {
        let body = Self::build_request(prompt, descriptor);
        match send_json::<_, GenerateResponse>(self.client.post(self.endpoint()), &body).await {
            Ok(response) => Self::interpret(response),
            Err(outcome) => outcome,
        }
    }
}
