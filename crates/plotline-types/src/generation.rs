//! Request-side domain types for the generation layer.
//!
//! A [`GenerationRequest`] is one logical ask from the host application: a
//! use case, an ordered set of prioritized [`ContentBlock`]s, and the
//! [`OutputShape`] the answer must satisfy. [`BackendDescriptor`] is the
//! static capability record the selection strategy and allocator reason about.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shape::OutputShape;

/// The three generation goals the layer supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    ActionGeneration,
    ObjectivePlanning,
    MemorySummary,
}

impl UseCase {
    pub const ALL: [UseCase; 3] = [
        UseCase::ActionGeneration,
        UseCase::ObjectivePlanning,
        UseCase::MemorySummary,
    ];
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UseCase::ActionGeneration => write!(f, "action_generation"),
            UseCase::ObjectivePlanning => write!(f, "objective_planning"),
            UseCase::MemorySummary => write!(f, "memory_summary"),
        }
    }
}

impl FromStr for UseCase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "action_generation" => Ok(UseCase::ActionGeneration),
            "objective_planning" => Ok(UseCase::ObjectivePlanning),
            "memory_summary" => Ok(UseCase::MemorySummary),
            other => Err(format!("invalid use case: '{other}'")),
        }
    }
}

/// Inclusion priority of a content block.
///
/// Declared from most to least important so that the derived `Ord` sorts
/// `Critical` first. `Critical` blocks are never dropped; `Optional` blocks
/// are the first to go under budget pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Optional,
}

impl Priority {
    /// All priorities in allocation order (most important first).
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::Optional,
    ];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
            Priority::Optional => write!(f, "optional"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            "optional" => Ok(Priority::Optional),
            other => Err(format!("invalid priority: '{other}'")),
        }
    }
}

/// Ordinal content-intensity classification.
///
/// Total ordering: `Mild < Moderate < Mature < Unrestricted`. A backend that
/// accepts a tier accepts every lower tier as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityTier {
    Mild,
    Moderate,
    Mature,
    Unrestricted,
}

impl IntensityTier {
    pub const ALL: [IntensityTier; 4] = [
        IntensityTier::Mild,
        IntensityTier::Moderate,
        IntensityTier::Mature,
        IntensityTier::Unrestricted,
    ];

    /// The next tier up, saturating at `Unrestricted`.
    pub fn escalate(self) -> Self {
        match self {
            IntensityTier::Mild => IntensityTier::Moderate,
            IntensityTier::Moderate => IntensityTier::Mature,
            IntensityTier::Mature | IntensityTier::Unrestricted => IntensityTier::Unrestricted,
        }
    }
}

impl fmt::Display for IntensityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntensityTier::Mild => write!(f, "mild"),
            IntensityTier::Moderate => write!(f, "moderate"),
            IntensityTier::Mature => write!(f, "mature"),
            IntensityTier::Unrestricted => write!(f, "unrestricted"),
        }
    }
}

impl FromStr for IntensityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mild" => Ok(IntensityTier::Mild),
            "moderate" => Ok(IntensityTier::Moderate),
            "mature" => Ok(IntensityTier::Mature),
            "unrestricted" => Ok(IntensityTier::Unrestricted),
            other => Err(format!("invalid intensity tier: '{other}'")),
        }
    }
}

/// Prompt idiom preferred by a backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptFamily {
    /// XML-style tagged sections.
    Tagged,
    /// Headings with fenced code blocks.
    Markdown,
    /// Minimal labeled paragraphs.
    Plain,
}

impl PromptFamily {
    pub const ALL: [PromptFamily; 3] =
        [PromptFamily::Tagged, PromptFamily::Markdown, PromptFamily::Plain];
}

impl fmt::Display for PromptFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptFamily::Tagged => write!(f, "tagged"),
            PromptFamily::Markdown => write!(f, "markdown"),
            PromptFamily::Plain => write!(f, "plain"),
        }
    }
}

impl FromStr for PromptFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tagged" => Ok(PromptFamily::Tagged),
            "markdown" => Ok(PromptFamily::Markdown),
            "plain" => Ok(PromptFamily::Plain),
            other => Err(format!("invalid prompt family: '{other}'")),
        }
    }
}

/// One labeled, prioritized unit of context considered for a prompt.
///
/// Blocks are immutable once built: truncation produces a new block via
/// [`ContentBlock::truncated`] rather than editing in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    label: String,
    text: String,
    priority: Priority,
    /// Chronological sequence this block belongs to (e.g. "recent_events").
    /// Blocks of one sequence appear oldest first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sequence: Option<String>,
    #[serde(default)]
    approx_tokens: u32,
}

impl ContentBlock {
    /// Build a block with a pre-computed token estimate.
    pub fn new(
        label: impl Into<String>,
        text: impl Into<String>,
        priority: Priority,
        approx_tokens: u32,
    ) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
            priority,
            sequence: None,
            approx_tokens,
        }
    }

    /// Mark this block as an item of a chronological sequence.
    pub fn in_sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = Some(sequence.into());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn sequence(&self) -> Option<&str> {
        self.sequence.as_deref()
    }

    pub fn approx_tokens(&self) -> u32 {
        self.approx_tokens
    }

    /// A copy of this block with a different token estimate.
    pub fn with_estimate(&self, approx_tokens: u32) -> Self {
        Self {
            approx_tokens,
            ..self.clone()
        }
    }

    /// A new block carrying shortened text and its fresh estimate.
    pub fn truncated(&self, text: String, approx_tokens: u32) -> Self {
        Self {
            label: self.label.clone(),
            text,
            priority: self.priority,
            sequence: self.sequence.clone(),
            approx_tokens,
        }
    }
}

/// One logical generation ask, consumed exactly once by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    pub use_case: UseCase,
    /// Insertion order is meaningful (e.g. chronological memory).
    pub blocks: Vec<ContentBlock>,
    pub expected_shape: OutputShape,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_count: Option<u32>,
}

/// Static capability record for one registered backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Stable name, e.g. "anthropic:sonnet" or "local:llama70b".
    pub identifier: String,
    pub family: PromptFamily,
    /// Model name sent on the wire.
    pub model: String,
    /// Rated context window in tokens.
    pub capacity_tokens: u32,
    /// Upper bound on generated tokens requested from the backend.
    pub max_output_tokens: u32,
    /// Highest tier this backend reliably accepts without refusing.
    pub max_permitted_tier: IntensityTier,
    /// Higher is better. Primary tie-breaker in candidate ordering.
    pub quality: u32,
    /// Lower is cheaper. Secondary tie-breaker in candidate ordering.
    pub cost_rank: u32,
}

impl BackendDescriptor {
    /// Whether this backend will accept content of the given tier.
    pub fn permits(&self, tier: IntensityTier) -> bool {
        self.max_permitted_tier >= tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_case_roundtrip() {
        for uc in UseCase::ALL {
            let parsed: UseCase = uc.to_string().parse().unwrap();
            assert_eq!(uc, parsed);
        }
    }

    #[test]
    fn test_priority_ordering_critical_first() {
        let mut all = vec![Priority::Optional, Priority::High, Priority::Critical];
        all.sort();
        assert_eq!(all, vec![Priority::Critical, Priority::High, Priority::Optional]);
    }

    #[test]
    fn test_tier_total_order() {
        assert!(IntensityTier::Mild < IntensityTier::Moderate);
        assert!(IntensityTier::Moderate < IntensityTier::Mature);
        assert!(IntensityTier::Mature < IntensityTier::Unrestricted);
    }

    #[test]
    fn test_tier_escalate_saturates() {
        assert_eq!(IntensityTier::Mild.escalate(), IntensityTier::Moderate);
        assert_eq!(
            IntensityTier::Unrestricted.escalate(),
            IntensityTier::Unrestricted
        );
    }

    #[test]
    fn test_tier_serde() {
        let json = serde_json::to_string(&IntensityTier::Unrestricted).unwrap();
        assert_eq!(json, "\"unrestricted\"");
    }

    #[test]
    fn test_family_from_str_rejects_unknown() {
        assert!("yaml".parse::<PromptFamily>().is_err());
        assert_eq!("Tagged".parse::<PromptFamily>().unwrap(), PromptFamily::Tagged);
    }

    #[test]
    fn test_truncated_block_is_new_value() {
        let block = ContentBlock::new("scene", "A long scene. More.", Priority::High, 6)
            .in_sequence("recent_events");
        let short = block.truncated("A long scene.".to_string(), 4);
        assert_eq!(block.text(), "A long scene. More.");
        assert_eq!(short.text(), "A long scene.");
        assert_eq!(short.label(), "scene");
        assert_eq!(short.sequence(), Some("recent_events"));
        assert_eq!(short.approx_tokens(), 4);
    }

    #[test]
    fn test_descriptor_permits_lower_tiers() {
        let desc = BackendDescriptor {
            identifier: "anthropic:sonnet".into(),
            family: PromptFamily::Tagged,
            model: "claude-sonnet-4-20250514".into(),
            capacity_tokens: 200_000,
            max_output_tokens: 2_048,
            max_permitted_tier: IntensityTier::Mature,
            quality: 90,
            cost_rank: 3,
        };
        assert!(desc.permits(IntensityTier::Mild));
        assert!(desc.permits(IntensityTier::Mature));
        assert!(!desc.permits(IntensityTier::Unrestricted));
    }

    #[test]
    fn test_request_deserialize_assigns_id() {
        let json = r#"{
            "use_case": "memory_summary",
            "blocks": [{"label": "event_1", "text": "The bell rang.", "priority": "medium"}],
            "expected_shape": {"name": "summary", "root": {"type": "string"}}
        }"#;
        let req: GenerationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.use_case, UseCase::MemorySummary);
        assert_eq!(req.blocks[0].approx_tokens(), 0);
        assert!(req.desired_count.is_none());
    }
}
