//! Adaptive recency window for chronological block sequences.
//!
//! Small-context backends see only the most recent items of each sequence
//! (e.g. the last six memories on an 8k model, the last twenty-four on a
//! 128k model). The window runs before budget allocation so that a short
//! history is never crowded out by stale entries.

use std::collections::HashMap;

use plotline_types::config::{PlotlineConfig, WindowStep};
use plotline_types::generation::{ContentBlock, Priority};

/// Step table mapping backend capacity to items kept per sequence.
#[derive(Debug, Clone)]
pub struct AdaptiveWindow {
    steps: Vec<WindowStep>,
    max_items: usize,
}

/// Blocks surviving the window, paired with their original index.
#[derive(Debug)]
pub struct Windowed<'a> {
    pub kept: Vec<(usize, &'a ContentBlock)>,
    pub trimmed_labels: Vec<String>,
}

impl AdaptiveWindow {
    /// `steps` must be ascending by `max_capacity`.
    pub fn new(steps: Vec<WindowStep>, max_items: usize) -> Self {
        Self { steps, max_items }
    }

    pub fn from_config(config: &PlotlineConfig) -> Self {
        Self::new(config.window_steps.clone(), config.window_max_items)
    }

    /// Items kept per sequence for a backend of the given capacity.
    pub fn items_for(&self, capacity_tokens: u32) -> usize {
        self.steps
            .iter()
            .find(|step| capacity_tokens <= step.max_capacity)
            .map(|step| step.items)
            .unwrap_or(self.max_items)
    }

    /// Keep the newest items of every sequence.
    ///
    /// Blocks outside a sequence and `Critical` blocks always pass; they do
    /// not count against the window either.
    pub fn apply<'a>(&self, blocks: &'a [ContentBlock], capacity_tokens: u32) -> Windowed<'a> {
        let limit = self.items_for(capacity_tokens);

        let mut totals: HashMap<&str, usize> = HashMap::new();
        for block in blocks.iter().filter(|b| windowed(b)) {
            if let Some(seq) = block.sequence() {
                *totals.entry(seq).or_default() += 1;
            }
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut kept = Vec::with_capacity(blocks.len());
        let mut trimmed_labels = Vec::new();

        for (index, block) in blocks.iter().enumerate() {
            let Some(seq) = block.sequence().filter(|_| windowed(block)) else {
                kept.push((index, block));
                continue;
            };
            let position = seen.entry(seq).or_default();
            let skip = totals.get(seq).copied().unwrap_or(0).saturating_sub(limit);
            if *position < skip {
                trimmed_labels.push(block.label().to_string());
            } else {
                kept.push((index, block));
            }
            *position += 1;
        }

        if !trimmed_labels.is_empty() {
            tracing::debug!(
                limit,
                capacity_tokens,
                trimmed = trimmed_labels.len(),
                "Window trimmed older sequence items"
            );
        }

        Windowed {
            kept,
            trimmed_labels,
        }
    }
}

fn windowed(block: &ContentBlock) -> bool {
    block.sequence().is_some() && block.priority() != Priority::Critical
}
