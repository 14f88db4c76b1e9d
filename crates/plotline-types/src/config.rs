//! Configuration types for Plotline.
//!
//! `PlotlineConfig` represents the top-level `config.toml` that controls
//! context headroom, retry policy, adaptive window sizing, the backend
//! registry, and the routing table. All fields have sensible defaults.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::generation::{BackendDescriptor, IntensityTier, PromptFamily, UseCase};

/// Wire protocol spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Anthropic,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    Ollama,
}

impl BackendKind {
    /// The prompt idiom this protocol's models prefer.
    pub fn default_family(&self) -> PromptFamily {
        match self {
            BackendKind::Anthropic => PromptFamily::Tagged,
            BackendKind::OpenAiCompatible => PromptFamily::Markdown,
            BackendKind::Ollama => PromptFamily::Plain,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Anthropic => write!(f, "anthropic"),
            BackendKind::OpenAiCompatible => write!(f, "openai_compatible"),
            BackendKind::Ollama => write!(f, "ollama"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(BackendKind::Anthropic),
            "openai_compatible" => Ok(BackendKind::OpenAiCompatible),
            "ollama" => Ok(BackendKind::Ollama),
            other => Err(format!("invalid backend kind: '{other}'")),
        }
    }
}

/// Configuration for one backend in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Stable identifier, e.g. "anthropic:sonnet".
    pub identifier: String,
    pub kind: BackendKind,
    pub model: String,
    /// Overrides the kind's default prompt family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<PromptFamily>,
    pub capacity_tokens: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    pub max_permitted_tier: IntensityTier,
    #[serde(default)]
    pub quality: u32,
    #[serde(default)]
    pub cost_rank: u32,
    /// Environment variable holding the credential. For hosted kinds this is
    /// the API key; for `ollama` it is the server base URL.
    pub credential_env: String,
    /// Override the default base URL for hosted kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_max_output_tokens() -> u32 {
    2_048
}

impl BackendConfig {
    pub fn family(&self) -> PromptFamily {
        self.family.unwrap_or_else(|| self.kind.default_family())
    }

    /// The static capability record registered for this backend.
    pub fn descriptor(&self) -> BackendDescriptor {
        BackendDescriptor {
            identifier: self.identifier.clone(),
            family: self.family(),
            model: self.model.clone(),
            capacity_tokens: self.capacity_tokens,
            max_output_tokens: self.max_output_tokens,
            max_permitted_tier: self.max_permitted_tier,
            quality: self.quality,
            cost_rank: self.cost_rank,
        }
    }
}

/// One step of the adaptive window table: backends with a capacity up to
/// `max_capacity` keep at most `items` entries of each chronological sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStep {
    pub max_capacity: u32,
    pub items: usize,
}

/// A routing-table entry: preferred backends for one (use case, tier) cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub use_case: UseCase,
    pub tier: IntensityTier,
    pub prefer: Vec<String>,
}

/// Additional classifier marker stems, merged into the built-in lexicon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkerOverrides {
    #[serde(default)]
    pub moderate: Vec<String>,
    #[serde(default)]
    pub mature: Vec<String>,
    #[serde(default)]
    pub unrestricted: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Distinct markers of one tier needed to escalate to the next tier.
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: usize,
    #[serde(default)]
    pub extra_markers: MarkerOverrides,
}

fn default_escalation_threshold() -> usize {
    3
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: default_escalation_threshold(),
            extra_markers: MarkerOverrides::default(),
        }
    }
}

/// Top-level configuration for Plotline.
///
/// Loaded from `~/.plotline/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotlineConfig {
    /// Fraction of a backend's capacity reserved for its response.
    #[serde(default = "default_response_headroom")]
    pub response_headroom: f64,

    /// Truncations of non-critical blocks shorter than this are dropped.
    #[serde(default = "default_min_useful_tokens")]
    pub min_useful_tokens: u32,

    /// Same-candidate retries after a transient failure.
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,

    /// Fixed delay before a same-candidate retry.
    #[serde(default = "default_transient_backoff_ms")]
    pub transient_backoff_ms: u64,

    /// Network timeout applied by every adapter.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_window_steps")]
    pub window_steps: Vec<WindowStep>,

    /// Window size for capacities above every step.
    #[serde(default = "default_window_max_items")]
    pub window_max_items: usize,

    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,

    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    #[serde(default)]
    pub classifier: ClassifierConfig,
}

fn default_response_headroom() -> f64 {
    0.20
}

fn default_min_useful_tokens() -> u32 {
    24
}

fn default_transient_retries() -> u32 {
    1
}

fn default_transient_backoff_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_window_steps() -> Vec<WindowStep> {
    vec![
        WindowStep {
            max_capacity: 8_192,
            items: 6,
        },
        WindowStep {
            max_capacity: 32_768,
            items: 12,
        },
        WindowStep {
            max_capacity: 131_072,
            items: 24,
        },
    ]
}

fn default_window_max_items() -> usize {
    48
}

fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig {
            identifier: "anthropic:sonnet".to_string(),
            kind: BackendKind::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            family: None,
            capacity_tokens: 200_000,
            max_output_tokens: default_max_output_tokens(),
            max_permitted_tier: IntensityTier::Mature,
            quality: 90,
            cost_rank: 3,
            credential_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
        },
        BackendConfig {
            identifier: "openai:gpt-4o".to_string(),
            kind: BackendKind::OpenAiCompatible,
            model: "gpt-4o".to_string(),
            family: None,
            capacity_tokens: 128_000,
            max_output_tokens: default_max_output_tokens(),
            max_permitted_tier: IntensityTier::Moderate,
            quality: 85,
            cost_rank: 2,
            credential_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
        },
        BackendConfig {
            identifier: "local:llama70b".to_string(),
            kind: BackendKind::Ollama,
            model: "llama3.1:70b".to_string(),
            family: None,
            capacity_tokens: 8_192,
            max_output_tokens: 1_024,
            max_permitted_tier: IntensityTier::Unrestricted,
            quality: 60,
            cost_rank: 0,
            credential_env: "OLLAMA_HOST".to_string(),
            base_url: None,
        },
    ]
}

impl Default for PlotlineConfig {
    fn default() -> Self {
        Self {
            response_headroom: default_response_headroom(),
            min_useful_tokens: default_min_useful_tokens(),
            transient_retries: default_transient_retries(),
            transient_backoff_ms: default_transient_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            window_steps: default_window_steps(),
            window_max_items: default_window_max_items(),
            backends: default_backends(),
            routes: Vec::new(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl PlotlineConfig {
    /// Response headroom clamped to a sane range.
    pub fn effective_headroom(&self) -> f64 {
        if self.response_headroom.is_nan() {
            return default_response_headroom();
        }
        self.response_headroom.clamp(0.05, 0.5)
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.identifier.as_str()) {
                return Err(ConfigError::DuplicateBackend(backend.identifier.clone()));
            }
            if backend.capacity_tokens == 0 {
                return Err(ConfigError::ZeroCapacity(backend.identifier.clone()));
            }
        }

        for route in &self.routes {
            if let Some(unknown) = route.prefer.iter().find(|id| !seen.contains(id.as_str())) {
                return Err(ConfigError::UnknownRoutedBackend {
                    use_case: route.use_case.to_string(),
                    tier: route.tier.to_string(),
                    backend: unknown.clone(),
                });
            }
        }

        if self
            .window_steps
            .windows(2)
            .any(|pair| pair[0].max_capacity >= pair[1].max_capacity)
        {
            return Err(ConfigError::UnorderedWindowSteps);
        }

        if self.classifier.escalation_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "classifier.escalation_threshold".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
