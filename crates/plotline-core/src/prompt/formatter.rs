//! Family-specific prompt rendering.
//!
//! One logical prompt (task, context blocks, output shape) is rendered in
//! the idiom each backend family follows best:
//!
//! - `Tagged`: XML-style sections (`<task>`, `<context>`, `<output_format>`)
//! - `Markdown`: headings with fenced blocks
//! - `Plain`: upper-case labels and paragraphs, for small local models
//!
//! Only the framing differs. Every rendering carries the same task text,
//! the same block texts verbatim, and the same shape description.

use serde::Serialize;

use plotline_types::generation::{ContentBlock, PromptFamily, UseCase};
use plotline_types::shape::OutputShape;

use super::shape_text::{count_hint, describe_shape};

const SYSTEM_PREAMBLE: &str = "You are the narrative engine of a turn-based story. \
You write in-character content for the story's participants, grounded only in the \
context you are given.";

const JSON_ONLY: &str = "Respond with a single JSON value matching the output format. \
Do not add commentary, explanations, or code fences around it.";

/// A prompt rendered for one backend family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedPrompt {
    pub family: PromptFamily,
    pub system: String,
    pub user: String,
}

/// Stateless renderer from logical prompt parts to a [`FormattedPrompt`].
pub struct PromptFormatter;

impl PromptFormatter {
    /// Render the fitted blocks and output contract for `family`.
    pub fn format(
        use_case: UseCase,
        shape: &OutputShape,
        fitted: &[ContentBlock],
        family: PromptFamily,
        desired_count: Option<u32>,
    ) -> FormattedPrompt {
        let parts = Parts {
            task: task_instruction(use_case, desired_count),
            shape_name: &shape.name,
            schema: describe_shape(shape),
            count: count_hint(shape, desired_count),
            blocks: fitted,
        };

        let user = match family {
            PromptFamily::Tagged => render_tagged(&parts),
            PromptFamily::Markdown => render_markdown(&parts),
            PromptFamily::Plain => render_plain(&parts),
        };

        FormattedPrompt {
            family,
            system: SYSTEM_PREAMBLE.to_string(),
            user,
        }
    }
}

struct Parts<'a> {
    task: String,
    shape_name: &'a str,
    schema: String,
    count: Option<String>,
    blocks: &'a [ContentBlock],
}

impl Parts<'_> {
    fn rules(&self) -> String {
        match &self.count {
            Some(count) => format!("{count} {JSON_ONLY}"),
            None => JSON_ONLY.to_string(),
        }
    }
}

/// What the backend is asked to do, independent of framing.
pub fn task_instruction(use_case: UseCase, desired_count: Option<u32>) -> String {
    let count = desired_count.map_or_else(|| "several".to_string(), |n| n.to_string());
    match use_case {
        UseCase::ActionGeneration => format!(
            "Propose {count} distinct actions the character could take next. Each must fit \
             the character's identity, current state, and the scene."
        ),
        UseCase::ObjectivePlanning => format!(
            "Propose {count} objectives the character could pursue, ordered from most to \
             least pressing, with a short rationale for each."
        ),
        UseCase::MemorySummary => "Condense the events below into one memory written from the \
             character's perspective. Keep names, places, and consequences."
            .to_string(),
    }
}

fn render_tagged(parts: &Parts<'_>) -> String {
    let mut sections = Vec::with_capacity(4);

    sections.push(format!("<task>\n{}\n</task>", parts.task));

    if !parts.blocks.is_empty() {
        let blocks: Vec<String> = parts
            .blocks
            .iter()
            .map(|b| {
                format!(
                    "<block label=\"{}\" priority=\"{}\">\n{}\n</block>",
                    b.label(),
                    b.priority(),
                    b.text()
                )
            })
            .collect();
        sections.push(format!("<context>\n{}\n</context>", blocks.join("\n")));
    }

    sections.push(format!(
        "<output_format name=\"{}\">\n{}\n</output_format>",
        parts.shape_name, parts.schema
    ));
    sections.push(format!("<rules>\n{}\n</rules>", parts.rules()));

    sections.join("\n\n")
}

fn render_markdown(parts: &Parts<'_>) -> String {
    let mut sections = Vec::with_capacity(4);

    sections.push(format!("## Task\n\n{}", parts.task));

    if !parts.blocks.is_empty() {
        let blocks: Vec<String> = parts
            .blocks
            .iter()
            .map(|b| {
                let fence = fence_for(b.text());
                format!(
                    "### {}\n\n{fence}text\n{}\n{fence}",
                    humanize(b.label()),
                    b.text()
                )
            })
            .collect();
        sections.push(format!("## Context\n\n{}", blocks.join("\n\n")));
    }

    sections.push(format!(
        "## Output Format: {}\n\n```\n{}\n```",
        parts.shape_name, parts.schema
    ));
    sections.push(format!("## Rules\n\n{}", parts.rules()));

    sections.join("\n\n")
}

fn render_plain(parts: &Parts<'_>) -> String {
    let mut sections = Vec::with_capacity(parts.blocks.len() + 3);

    sections.push(format!("TASK: {}", parts.task));

    for block in parts.blocks {
        sections.push(format!(
            "{}:\n{}",
            humanize(block.label()).to_uppercase(),
            block.text()
        ));
    }

    sections.push(format!(
        "OUTPUT FORMAT ({}):\n{}",
        parts.shape_name, parts.schema
    ));
    sections.push(parts.rules());

    sections.join("\n\n")
}

/// "working_memory_turn_7" -> "Working memory turn 7".
fn humanize(label: &str) -> String {
    let spaced = label.replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A backtick fence longer than any backtick run inside `text`.
fn fence_for(text: &str) -> String {
    let longest = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}
