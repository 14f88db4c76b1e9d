//! Lexical content-intensity classification.
//!
//! Each tier above `Mild` has a list of marker stems. A stem matches where
//! it starts a word (case-insensitive), so "stab" matches "stabbed" but not
//! "establish". The resulting tier is the highest tier with a match,
//! escalated one step when `Mild` or `Moderate` accumulates
//! `escalation_threshold` distinct markers. `Unrestricted` is never reached
//! by density alone; it takes a marker of its own.
//!
//! Matching only ever adds markers as text is appended, so the tier of a
//! block set never decreases when content is added. On uncertainty the
//! classifier errs high: an over-classified request costs a routing choice,
//! an under-classified one costs a refusal.

use std::collections::BTreeSet;

use plotline_types::config::ClassifierConfig;
use plotline_types::generation::{ContentBlock, IntensityTier};

const MODERATE_MARKERS: &[&str] = &[
    "fight", "punch", "slap", "shove", "brawl", "threat", "menac", "blood", "bleed", "wound",
    "injur", "bruis", "weapon", "sword", "dagger", "knife", "blade", "steal", "thief", "drunk",
    "curse", "insult", "scream",
];

const MATURE_MARKERS: &[&str] = &[
    "kill", "murder", "stab", "slay", "slain", "slew", "corpse", "death", "dying", "died",
    "strangl", "behead", "execut", "massacre", "poison", "assassin", "suicid", "throat",
    "through the heart",
];

const UNRESTRICTED_MARKERS: &[&str] = &[
    "dismember", "disembowel", "mutilat", "eviscerat", "flay", "gore", "gory", "tortur", "rape",
    "sexual", "naked", "nude", "genital", "coerc", "explicit", "against her will",
    "against his will", "against their will",
];

/// Result of classifying a block set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntensityAssessment {
    pub tier: IntensityTier,
    /// Distinct markers that matched, with the tier they indicate.
    pub markers: Vec<(IntensityTier, String)>,
    /// Whether the tier was raised by marker density.
    pub escalated: bool,
}

/// Maps a block set to the minimum intensity tier a backend must accept.
#[derive(Debug, Clone)]
pub struct ContentClassifier {
    lexicon: Vec<(IntensityTier, Vec<String>)>,
    escalation_threshold: usize,
}

impl ContentClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let merge = |builtin: &[&str], extra: &[String]| -> Vec<String> {
            let mut stems: Vec<String> = builtin.iter().map(|s| (*s).to_string()).collect();
            stems.extend(
                extra
                    .iter()
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty()),
            );
            stems.sort();
            stems.dedup();
            stems
        };

        let extra = &config.extra_markers;
        Self {
            lexicon: vec![
                (IntensityTier::Moderate, merge(MODERATE_MARKERS, &extra.moderate)),
                (IntensityTier::Mature, merge(MATURE_MARKERS, &extra.mature)),
                (IntensityTier::Unrestricted, merge(UNRESTRICTED_MARKERS, &extra.unrestricted)),
            ],
            escalation_threshold: config.escalation_threshold.max(1),
        }
    }

    /// Classify a block set. Pure and deterministic.
    pub fn classify(&self, blocks: &[ContentBlock]) -> IntensityTier {
        self.assess(blocks).tier
    }

    /// Classify a block set and report the evidence.
    pub fn assess(&self, blocks: &[ContentBlock]) -> IntensityAssessment {
        let mut found: BTreeSet<(IntensityTier, &str)> = BTreeSet::new();

        for block in blocks {
            let text = block.text().to_lowercase();
            for (tier, stems) in &self.lexicon {
                for stem in stems {
                    if starts_a_word(&text, stem) {
                        found.insert((*tier, stem.as_str()));
                    }
                }
            }
        }

        let base = found
            .iter()
            .map(|(tier, _)| *tier)
            .max()
            .unwrap_or(IntensityTier::Mild);

        let escalated_to = IntensityTier::ALL
            .iter()
            .filter(|tier| **tier < IntensityTier::Mature)
            .filter(|tier| {
                found.iter().filter(|(t, _)| t == *tier).count() >= self.escalation_threshold
            })
            .map(|tier| tier.escalate())
            .max();

        let tier = escalated_to.map_or(base, |up| up.max(base));

        IntensityAssessment {
            tier,
            escalated: tier > base,
            markers: found
                .into_iter()
                .map(|(tier, stem)| (tier, stem.to_string()))
                .collect(),
        }
    }
}

impl Default for ContentClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

/// Whether `stem` occurs in `text` at the start of a word.
fn starts_a_word(text: &str, stem: &str) -> bool {
    text.match_indices(stem).any(|(i, _)| {
        text[..i]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric())
    })
}
