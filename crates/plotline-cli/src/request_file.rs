//! Request files: the JSON a host writes to hand a generation ask to the CLI.
//!
//! ```json
//! {
//!   "use_case": "action_generation",
//!   "desired_count": 4,
//!   "blocks": [
//!     {"label": "character_identity", "text": "...", "priority": "critical"},
//!     {"label": "turn_1", "text": "...", "priority": "medium", "sequence": "recent_events"}
//!   ]
//! }
//! ```
//!
//! `expected_shape` is optional and defaults to the use case's canonical
//! shape. Token estimates are always recomputed.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use plotline_core::context::builder::RequestBuilder;
use plotline_types::generation::{GenerationRequest, Priority, UseCase};
use plotline_types::shape::OutputShape;

#[derive(Debug, Deserialize)]
struct RequestFile {
    use_case: UseCase,
    #[serde(default)]
    desired_count: Option<u32>,
    #[serde(default)]
    expected_shape: Option<OutputShape>,
    blocks: Vec<BlockEntry>,
}

#[derive(Debug, Deserialize)]
struct BlockEntry {
    label: String,
    text: String,
    priority: Priority,
    #[serde(default)]
    sequence: Option<String>,
}

/// Parse request JSON into a [`GenerationRequest`].
pub fn parse_request(json: &str) -> Result<GenerationRequest> {
    let file: RequestFile = serde_json::from_str(json).context("invalid request file")?;

    let mut builder = RequestBuilder::new(file.use_case);
    for entry in file.blocks {
        builder = match entry.sequence {
            Some(sequence) => builder.sequence_item(&sequence, entry.label, entry.text, entry.priority),
            None => builder.block(entry.label, entry.text, entry.priority),
        };
    }
    if let Some(count) = file.desired_count {
        builder = builder.desired_count(count);
    }
    if let Some(shape) = file.expected_shape {
        builder = builder.expected_shape(shape);
    }
    Ok(builder.build())
}

/// Read and parse a request file.
pub async fn load_request(path: &Path) -> Result<GenerationRequest> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read request file {}", path.display()))?;
    parse_request(&content).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTION_REQUEST: &str = r#"{
        "use_case": "action_generation",
        "desired_count": 3,
        "blocks": [
            {"label": "character_identity", "text": "Mara, a smuggler.", "priority": "critical"},
            {"label": "turn_1", "text": "The patrol arrives.", "priority": "medium", "sequence": "recent_events"},
            {"label": "turn_2", "text": "Mara hides.", "priority": "medium", "sequence": "recent_events"}
        ]
    }"#;

    #[test]
    fn test_parse_request_defaults_shape() {
        let request = parse_request(ACTION_REQUEST).unwrap();
        assert_eq!(request.use_case, UseCase::ActionGeneration);
        assert_eq!(request.desired_count, Some(3));
        assert_eq!(request.expected_shape, OutputShape::action_options());
        assert_eq!(request.blocks.len(), 3);
        assert_eq!(request.blocks[1].sequence(), Some("recent_events"));
        assert!(request.blocks.iter().all(|b| b.approx_tokens() > 0));
    }

    #[test]
    fn test_parse_request_rejects_unknown_priority() {
        let json = r#"{"use_case": "memory_summary", "blocks": [{"label": "a", "text": "b", "priority": "urgent"}]}"#;
        assert!(parse_request(json).is_err());
    }

    #[tokio::test]
    async fn test_load_request_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("request.json");
        tokio::fs::write(&path, ACTION_REQUEST).await.unwrap();
        let request = load_request(&path).await.unwrap();
        assert_eq!(request.blocks[0].label(), "character_identity");
    }

    #[tokio::test]
    async fn test_load_request_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = load_request(&tmp.path().join("nope.json")).await.unwrap_err();
        assert!(err.to_string().contains("failed to read request file"));
    }
}
