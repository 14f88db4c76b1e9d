//! Human-in-the-loop fallback when every backend has failed.
//!
//! The handler presents what went wrong and what is expected, then reads a
//! JSON payload terminated by a line containing only `END`. Invalid input is
//! answered with the list of violations and another prompt; the loop only
//! ends on valid input or when the channel is interrupted or closed.
//!
//! Input is a single shared resource: concurrent requests that reach manual
//! fallback queue on the channel lock and are served one at a time.

use std::future::Future;

use serde_json::Value;
use tokio::sync::Mutex;

use plotline_types::error::{ManualInputError, ShapeViolations};
use plotline_types::generation::{ContentBlock, Priority, PromptFamily, UseCase};
use plotline_types::outcome::AttemptRecord;
use plotline_types::shape::OutputShape;

use super::output::parse_output;
use crate::context::truncate::truncate_to_budget;
use crate::prompt::shape_text::{count_hint, describe_shape};

/// Line that terminates one manual payload.
pub const END_SENTINEL: &str = "END";

/// Token budget of the context summary shown to the human.
pub const SUMMARY_TOKENS: u32 = 120;

const BANNER: &str = "==================== MANUAL INPUT REQUIRED ====================";

/// Events produced by a manual input channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// One line of input, without its newline.
    Line(String),
    /// End of input (Ctrl+D, closed pipe).
    Eof,
    /// Interrupt signal (Ctrl+C).
    Interrupted,
}

/// A bidirectional text channel to a human operator.
///
/// The CLI implements this over an async readline; tests script it.
pub trait ManualChannel: Send {
    /// Show text to the operator.
    fn present(&mut self, text: &str) -> impl Future<Output = ()> + Send;

    /// Wait for the next line of input.
    fn read_line(&mut self) -> impl Future<Output = InputEvent> + Send;
}

/// Everything the operator needs to produce a substitute result.
#[derive(Debug, Clone, Copy)]
pub struct ManualRequest<'a> {
    pub use_case: UseCase,
    pub shape: &'a OutputShape,
    pub desired_count: Option<u32>,
    pub context_summary: &'a str,
    pub attempted: &'a [AttemptRecord],
}

/// Blocks for a structurally valid human-supplied result.
pub struct ManualFallbackHandler<C> {
    channel: Mutex<C>,
}

impl<C: ManualChannel> ManualFallbackHandler<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel: Mutex::new(channel),
        }
    }

    /// Collect a value that validates against `request.shape`.
    ///
    /// Returns `Cancelled` on interrupt and `Closed` on end of input.
    pub async fn collect(&self, request: ManualRequest<'_>) -> Result<Value, ManualInputError> {
        let mut channel = self.channel.lock().await;
        tracing::info!(use_case = %request.use_case, "Waiting for manual input");

        channel.present(&render_header(&request)).await;

        let mut round = 0u32;
        loop {
            round += 1;
            channel
                .present(&format!(
                    "Enter JSON. Finish with a line containing only {END_SENTINEL}."
                ))
                .await;

            let payload = read_payload(&mut *channel).await?;
            match parse_output(&payload, request.shape, request.desired_count) {
                Ok(value) => {
                    tracing::info!(round, "Manual input accepted");
                    return Ok(value);
                }
                Err(violations) => {
                    tracing::debug!(round, errors = violations.len(), "Manual input rejected");
                    channel.present(&render_violations(&violations)).await;
                }
            }
        }
    }
}

async fn read_payload<C: ManualChannel>(channel: &mut C) -> Result<String, ManualInputError> {
    let mut lines = Vec::new();
    loop {
        match channel.read_line().await {
            InputEvent::Line(line) if line.trim() == END_SENTINEL => return Ok(lines.join("\n")),
            InputEvent::Line(line) => lines.push(line),
            InputEvent::Eof => return Err(ManualInputError::Closed),
            InputEvent::Interrupted => return Err(ManualInputError::Cancelled),
        }
    }
}

fn render_header(request: &ManualRequest<'_>) -> String {
    let mut sections = Vec::with_capacity(5);
    sections.push(format!("{BANNER}\nUse case: {}", request.use_case));

    if request.attempted.is_empty() {
        sections.push("No backends are configured.".to_string());
    } else {
        let tried: Vec<String> = request
            .attempted
            .iter()
            .map(|a| format!("  - {}: {}", a.backend, a.outcome))
            .collect();
        sections.push(format!("Backends tried:\n{}", tried.join("\n")));
    }

    if !request.context_summary.is_empty() {
        sections.push(format!("Context:\n{}", request.context_summary));
    }

    let mut expected = format!("Expected output ({}):\n{}", request.shape.name, describe_shape(request.shape));
    if let Some(hint) = count_hint(request.shape, request.desired_count) {
        expected.push('\n');
        expected.push_str(&hint);
    }
    sections.push(expected);

    sections.join("\n\n")
}

fn render_violations(violations: &ShapeViolations) -> String {
    let lines: Vec<String> = violations
        .iter()
        .map(|v| format!("  - {}: {}", v.path, v.message))
        .collect();
    format!("Invalid input:\n{}", lines.join("\n"))
}

/// Short digest of the most important blocks for the operator.
///
/// Critical blocks first, then high, each as `label: text`, cut to
/// [`SUMMARY_TOKENS`].
pub fn context_summary(blocks: &[ContentBlock]) -> String {
    let lines: Vec<String> = [Priority::Critical, Priority::High]
        .iter()
        .flat_map(|p| blocks.iter().filter(move |b| b.priority() == *p))
        .map(|b| format!("{}: {}", b.label(), b.text().trim()))
        .collect();
    truncate_to_budget(&lines.join("\n"), SUMMARY_TOKENS, PromptFamily::Plain)
}
