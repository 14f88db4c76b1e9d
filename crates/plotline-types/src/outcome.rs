//! Attempt outcomes and the final generation result.
//!
//! Every backend invocation resolves to exactly one [`AttemptOutcome`]; the
//! orchestrator collects them into an ordered attempt log that is returned
//! with every [`GenerationResult`], whichever path produced it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier recorded for values supplied through manual fallback.
pub const MANUAL_SOURCE: &str = "manual";

/// Result of one backend invocation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The backend replied with text (not yet validated).
    Success { raw_text: String },
    /// The backend declined on policy/content grounds. Advance.
    Refused { reason: String },
    /// Rate limit, timeout, or transport failure. Retry once, then advance.
    Transient { reason: String },
    /// The reply failed shape validation. Advance.
    MalformedOutput {
        raw_text: String,
        validation_error: String,
    },
    /// Auth or configuration failure. The backend is not used again.
    Fatal { reason: String },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success { .. })
    }

    /// Short variant name for logs and tables.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptOutcome::Success { .. } => "success",
            AttemptOutcome::Refused { .. } => "refused",
            AttemptOutcome::Transient { .. } => "transient",
            AttemptOutcome::MalformedOutput { .. } => "malformed_output",
            AttemptOutcome::Fatal { .. } => "fatal",
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        AttemptOutcome::Refused {
            reason: reason.into(),
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        AttemptOutcome::Transient {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        AttemptOutcome::Fatal {
            reason: reason.into(),
        }
    }

    pub fn malformed(raw_text: impl Into<String>, validation_error: impl Into<String>) -> Self {
        AttemptOutcome::MalformedOutput {
            raw_text: raw_text.into(),
            validation_error: validation_error.into(),
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success { raw_text } => {
                write!(f, "success ({} chars)", raw_text.chars().count())
            }
            AttemptOutcome::Refused { reason } => write!(f, "refused: {reason}"),
            AttemptOutcome::Transient { reason } => write!(f, "transient: {reason}"),
            AttemptOutcome::MalformedOutput {
                validation_error, ..
            } => write!(f, "malformed output: {validation_error}"),
            AttemptOutcome::Fatal { reason } => write!(f, "fatal: {reason}"),
        }
    }
}

/// One entry of the attempt log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Backend identifier, or [`MANUAL_SOURCE`].
    pub backend: String,
    pub outcome: AttemptOutcome,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
}

/// Where a generation value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "identifier", rename_all = "snake_case")]
pub enum ResultSource {
    Backend(String),
    Manual,
}

impl fmt::Display for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSource::Backend(id) => write!(f, "{id}"),
            ResultSource::Manual => write!(f, "{MANUAL_SOURCE}"),
        }
    }
}

/// Final output of the generation pipeline.
///
/// `value` and `source` are both present unless the caller cancelled the
/// request, in which case only the attempt log accumulated so far remains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub value: Option<Value>,
    pub source: Option<ResultSource>,
    pub attempts: Vec<AttemptRecord>,
}

impl GenerationResult {
    pub fn succeeded(value: Value, source: ResultSource, attempts: Vec<AttemptRecord>) -> Self {
        Self {
            value: Some(value),
            source: Some(source),
            attempts,
        }
    }

    pub fn aborted(attempts: Vec<AttemptRecord>) -> Self {
        Self {
            value: None,
            source: None,
            attempts,
        }
    }

    /// Whether the request was cancelled before producing a value.
    pub fn is_aborted(&self) -> bool {
        self.value.is_none()
    }

    /// Whether the value was supplied by a human.
    pub fn is_manual(&self) -> bool {
        matches!(self.source, Some(ResultSource::Manual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_serde_tagged() {
        let outcome = AttemptOutcome::malformed("{", "EOF while parsing");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "malformed_output");
        assert_eq!(json["validation_error"], "EOF while parsing");
        let back: AttemptOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            AttemptOutcome::refused("content policy").to_string(),
            "refused: content policy"
        );
        assert_eq!(
            AttemptOutcome::Success {
                raw_text: "héllo".into()
            }
            .to_string(),
            "success (5 chars)"
        );
    }

    #[test]
    fn test_result_source_display_and_serde() {
        assert_eq!(ResultSource::Manual.to_string(), "manual");
        let src = ResultSource::Backend("local:llama70b".into());
        assert_eq!(src.to_string(), "local:llama70b");
        let json = serde_json::to_value(&src).unwrap();
        assert_eq!(json, json!({"type": "backend", "identifier": "local:llama70b"}));
    }

    #[test]
    fn test_aborted_result_has_no_value() {
        let result = GenerationResult::aborted(vec![]);
        assert!(result.is_aborted());
        assert!(!result.is_manual());
        assert!(result.source.is_none());
    }
}
