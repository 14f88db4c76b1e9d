//! Priority-ordered context budget allocation.
//!
//! Given a block set and a backend's capacity, decide which blocks make it
//! into the prompt and in what (possibly truncated) form:
//!
//! 1. The adaptive window trims old items from chronological sequences.
//! 2. Every `Critical` block is included. If they alone overflow the
//!    budget, they are truncated starting from the last one, but never
//!    dropped; a remaining overflow is reported in [`Allocation`].
//! 3. `High` through `Optional` blocks fill the remainder in priority order,
//!    insertion order within a tier. A block that does not fit gets one
//!    truncation attempt; below `min_useful_tokens` it is dropped.
//!
//! The fitted blocks keep their original relative order.

use std::sync::Arc;

use plotline_types::config::PlotlineConfig;
use plotline_types::generation::{ContentBlock, Priority, PromptFamily};

use super::estimator::TokenEstimator;
use super::truncate::{minimal_prefix, truncate_to_budget};
use super::window::AdaptiveWindow;

/// Result of fitting a block set into one backend's budget.
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Blocks to render, in original order, with estimates for the target family.
    pub fitted: Vec<ContentBlock>,
    /// Labels removed by the window or by budget pressure.
    pub dropped_labels: Vec<String>,
    /// Labels of blocks included in shortened form.
    pub truncated_labels: Vec<String>,
    pub was_truncated: bool,
    pub used_tokens: u32,
    pub available_tokens: u32,
}

impl Allocation {
    /// Critical blocks alone exceeded the budget even at their floor.
    pub fn overflowed(&self) -> bool {
        self.used_tokens > self.available_tokens
    }

    /// Tokens by which the fitted set exceeds the budget.
    pub fn overflow_tokens(&self) -> u32 {
        self.used_tokens.saturating_sub(self.available_tokens)
    }
}

/// Fits content blocks into a backend's context budget.
pub struct ContextBudgetAllocator {
    estimator: Arc<TokenEstimator>,
    window: AdaptiveWindow,
    min_useful_tokens: u32,
}

struct Slot {
    index: usize,
    block: ContentBlock,
}

impl ContextBudgetAllocator {
    pub fn new(estimator: Arc<TokenEstimator>, window: AdaptiveWindow, min_useful_tokens: u32) -> Self {
        Self {
            estimator,
            window,
            min_useful_tokens,
        }
    }

    pub fn from_config(estimator: Arc<TokenEstimator>, config: &PlotlineConfig) -> Self {
        Self::new(
            estimator,
            AdaptiveWindow::from_config(config),
            config.min_useful_tokens,
        )
    }

    /// Fit `blocks` into `capacity_tokens - reserved_for_response` tokens as
    /// estimated for `family`.
    pub fn allocate(
        &self,
        blocks: &[ContentBlock],
        capacity_tokens: u32,
        reserved_for_response: u32,
        family: PromptFamily,
    ) -> Allocation {
        let available = capacity_tokens.saturating_sub(reserved_for_response);
        let windowed = self.window.apply(blocks, capacity_tokens);

        let mut dropped_labels = windowed.trimmed_labels;
        let mut truncated_labels = Vec::new();

        let estimated: Vec<Slot> = windowed
            .kept
            .into_iter()
            .map(|(index, block)| Slot {
                index,
                block: block.with_estimate(self.estimator.estimate(block.text(), family)),
            })
            .collect();

        let (critical, rest): (Vec<Slot>, Vec<Slot>) = estimated
            .into_iter()
            .partition(|slot| slot.block.priority() == Priority::Critical);

        let mut fitted = self.fit_critical(critical, available, family, &mut truncated_labels);
        let mut used: u32 = fitted.iter().map(|s| s.block.approx_tokens()).sum();

        for tier in &Priority::ALL[1..] {
            for slot in rest.iter().filter(|s| s.block.priority() == *tier) {
                let remaining = available.saturating_sub(used);
                let cost = slot.block.approx_tokens();

                if cost <= remaining {
                    used += cost;
                    fitted.push(Slot {
                        index: slot.index,
                        block: slot.block.clone(),
                    });
                    continue;
                }

                match self.shorten(&slot.block, remaining, family) {
                    Some(short) => {
                        used += short.approx_tokens();
                        truncated_labels.push(short.label().to_string());
                        fitted.push(Slot {
                            index: slot.index,
                            block: short,
                        });
                    }
                    None => dropped_labels.push(slot.block.label().to_string()),
                }
            }
        }

        fitted.sort_by_key(|slot| slot.index);

        let allocation = Allocation {
            fitted: fitted.into_iter().map(|slot| slot.block).collect(),
            was_truncated: !truncated_labels.is_empty() || used > available,
            dropped_labels,
            truncated_labels,
            used_tokens: used,
            available_tokens: available,
        };

        tracing::debug!(
            %family,
            available,
            used = allocation.used_tokens,
            fitted = allocation.fitted.len(),
            dropped = allocation.dropped_labels.len(),
            truncated = allocation.truncated_labels.len(),
            "Allocated context budget"
        );

        allocation
    }

    /// Include all critical blocks, truncating from the last one backwards
    /// until the set fits or every block is at its floor.
    fn fit_critical(
        &self,
        mut critical: Vec<Slot>,
        available: u32,
        family: PromptFamily,
        truncated_labels: &mut Vec<String>,
    ) -> Vec<Slot> {
        let mut total: u32 = critical.iter().map(|s| s.block.approx_tokens()).sum();

        for slot in critical.iter_mut().rev() {
            if total <= available {
                break;
            }
            let cost = slot.block.approx_tokens();
            let others = total - cost;
            let allowance = available.saturating_sub(others);

            let mut text = truncate_to_budget(slot.block.text(), allowance, family);
            if text.is_empty() {
                text = minimal_prefix(slot.block.text(), allowance, family);
            }
            if text.len() >= slot.block.text().len() {
                continue;
            }

            let estimate = self.estimator.estimate(&text, family);
            total = others + estimate;
            truncated_labels.push(slot.block.label().to_string());
            slot.block = slot.block.truncated(text, estimate);
        }

        if total > available {
            tracing::warn!(
                available,
                required = total,
                "Critical context exceeds budget even after truncation"
            );
        }

        critical
    }

    /// One truncation attempt for a non-critical block.
    fn shorten(&self, block: &ContentBlock, remaining: u32, family: PromptFamily) -> Option<ContentBlock> {
        if remaining < self.min_useful_tokens {
            return None;
        }
        let text = truncate_to_budget(block.text(), remaining, family);
        let estimate = self.estimator.estimate(&text, family);
        if text.is_empty() || estimate < self.min_useful_tokens || estimate > remaining {
            return None;
        }
        Some(block.truncated(text, estimate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::estimator::approximate_tokens;

    const FAMILY: PromptFamily = PromptFamily::Markdown;

    fn allocator(min_useful: u32) -> ContextBudgetAllocator {
        ContextBudgetAllocator::from_config(
            Arc::new(TokenEstimator::new()),
            &PlotlineConfig {
                min_useful_tokens: min_useful,
                ..PlotlineConfig::default()
            },
        )
    }

    fn words(label: &str, count: usize, priority: Priority) -> ContentBlock {
        let text = (0..count).map(|i| format!("w{:02}", i % 100)).collect::<Vec<_>>().join(" ");
        let est = approximate_tokens(&text, FAMILY);
        ContentBlock::new(label, text, priority, est)
    }

    #[test]
    fn test_everything_fits() {
        let blocks = vec![
            words("identity", 10, Priority::Critical),
            words("scene", 10, Priority::High),
            words("gossip", 10, Priority::Optional),
        ];
        let out = allocator(4).allocate(&blocks, 1_000, 200, FAMILY);
        assert_eq!(out.fitted.len(), 3);
        assert!(!out.was_truncated);
        assert!(out.dropped_labels.is_empty());
        assert!(!out.overflowed());
    }

    #[test]
    fn test_single_critical_block_truncated_to_budget() {
        // One 50-token critical block, 10 tokens available.
        let text = "The old keeper guards the northern gate. ".repeat(5);
        let est = approximate_tokens(&text, FAMILY);
        assert_eq!(est, 52);
        let blocks = vec![ContentBlock::new("identity", text.clone(), Priority::Critical, est)];

        let out = allocator(4).allocate(&blocks, 12, 2, FAMILY);
        assert_eq!(out.available_tokens, 10);
        assert_eq!(out.fitted.len(), 1);
        assert!(out.was_truncated);
        assert!(out.fitted[0].approx_tokens() <= 10);
        assert!(text.starts_with(out.fitted[0].text()));
        assert!(out.fitted[0].text().ends_with('.'));
        assert!(!out.overflowed());
    }

    #[test]
    fn test_critical_never_dropped() {
        let blocks = vec![
            words("identity", 40, Priority::Critical),
            words("goal", 40, Priority::Critical),
            words("scene", 40, Priority::High),
        ];
        let out = allocator(4).allocate(&blocks, 30, 0, FAMILY);
        let labels: Vec<&str> = out.fitted.iter().map(|b| b.label()).collect();
        assert!(labels.contains(&"identity"));
        assert!(labels.contains(&"goal"));
        assert_eq!(out.dropped_labels, vec!["scene".to_string()]);
    }

    #[test]
    fn test_critical_truncated_from_last() {
        let blocks = vec![
            words("identity", 20, Priority::Critical),
            words("goal", 20, Priority::Critical),
        ];
        let out = allocator(4).allocate(&blocks, 30, 0, FAMILY);
        assert_eq!(out.fitted[0].text(), blocks[0].text());
        assert!(out.fitted[1].approx_tokens() <= 10);
        assert_eq!(out.truncated_labels, vec!["goal".to_string()]);
    }

    #[test]
    fn test_critical_overflow_reported() {
        let blocks = vec![
            words("a", 5, Priority::Critical),
            words("b", 5, Priority::Critical),
            words("c", 5, Priority::Critical),
        ];
        // Each block's floor is one word, so three words cannot fit in two tokens.
        let out = allocator(4).allocate(&blocks, 2, 0, FAMILY);
        assert_eq!(out.fitted.len(), 3);
        assert!(out.overflowed());
        assert!(out.overflow_tokens() >= 1);
    }

    #[test]
    fn test_overflow_at_floor_marks_truncated() {
        // Single-word critical blocks are already at their floor.
        let blocks = vec![
            words("a", 1, Priority::Critical),
            words("b", 1, Priority::Critical),
            words("c", 1, Priority::Critical),
        ];
        let out = allocator(4).allocate(&blocks, 2, 0, FAMILY);
        assert_eq!(out.fitted.len(), 3);
        assert!(out.overflowed());
        assert!(out.was_truncated);
        assert!(out.truncated_labels.is_empty());
    }

    #[test]
    fn test_lower_priority_dropped_first() {
        let blocks = vec![
            words("gossip", 20, Priority::Optional),
            words("scene", 20, Priority::High),
            words("memory", 20, Priority::Medium),
        ];
        let out = allocator(10).allocate(&blocks, 45, 0, FAMILY);
        let labels: Vec<&str> = out.fitted.iter().map(|b| b.label()).collect();
        assert_eq!(labels, vec!["scene", "memory"]);
        assert_eq!(out.dropped_labels, vec!["gossip".to_string()]);
    }

    #[test]
    fn test_partial_fit_truncates_once() {
        let blocks = vec![
            words("scene", 20, Priority::High),
            words("memory", 40, Priority::Medium),
        ];
        let out = allocator(5).allocate(&blocks, 35, 0, FAMILY);
        assert_eq!(out.fitted.len(), 2);
        assert_eq!(out.truncated_labels, vec!["memory".to_string()]);
        assert!(out.used_tokens <= 35);
    }

    #[test]
    fn test_tiny_remainder_drops_instead_of_truncating() {
        let blocks = vec![
            words("scene", 30, Priority::High),
            words("memory", 40, Priority::Medium),
        ];
        let out = allocator(10).allocate(&blocks, 35, 0, FAMILY);
        let labels: Vec<&str> = out.fitted.iter().map(|b| b.label()).collect();
        assert_eq!(labels, vec!["scene"]);
        assert_eq!(out.dropped_labels, vec!["memory".to_string()]);
    }

    #[test]
    fn test_smaller_later_block_still_fits() {
        let blocks = vec![
            words("scene", 20, Priority::High),
            words("long_memory", 50, Priority::Medium),
            words("short_memory", 5, Priority::Medium),
        ];
        let out = allocator(20).allocate(&blocks, 30, 0, FAMILY);
        let labels: Vec<&str> = out.fitted.iter().map(|b| b.label()).collect();
        assert_eq!(labels, vec!["scene", "short_memory"]);
    }

    #[test]
    fn test_original_order_preserved() {
        let blocks = vec![
            words("optional_first", 5, Priority::Optional),
            words("critical_second", 5, Priority::Critical),
            words("high_third", 5, Priority::High),
        ];
        let out = allocator(4).allocate(&blocks, 1_000, 0, FAMILY);
        let labels: Vec<&str> = out.fitted.iter().map(|b| b.label()).collect();
        assert_eq!(labels, vec!["optional_first", "critical_second", "high_third"]);
    }

    #[test]
    fn test_fitted_estimates_use_target_family() {
        let blocks = vec![words("scene", 8, Priority::High)];
        let out = allocator(4).allocate(&blocks, 1_000, 0, PromptFamily::Plain);
        assert_eq!(
            out.fitted[0].approx_tokens(),
            approximate_tokens(blocks[0].text(), PromptFamily::Plain)
        );
    }

    #[test]
    fn test_window_trims_before_budget() {
        let blocks: Vec<ContentBlock> = (0..10)
            .map(|i| words(&format!("memory_{i}"), 3, Priority::Medium).in_sequence("memories"))
            .collect();
        let out = allocator(1).allocate(&blocks, 8_000, 1_600, FAMILY);
        assert_eq!(out.fitted.len(), 6);
        assert_eq!(out.fitted[0].label(), "memory_4");
        assert_eq!(out.dropped_labels.len(), 4);
    }

    #[test]
    fn test_used_never_exceeds_available_without_overflow() {
        let blocks: Vec<ContentBlock> = (0..12)
            .map(|i| {
                let priority = Priority::ALL[i % 5];
                words(&format!("b{i}"), 5 + i * 3, priority)
            })
            .collect();
        for capacity in [20, 50, 80, 120, 400] {
            let out = allocator(6).allocate(&blocks, capacity, 0, FAMILY);
            let sum: u32 = out.fitted.iter().map(|b| b.approx_tokens()).sum();
            assert_eq!(sum, out.used_tokens);
            if !out.overflowed() {
                assert!(out.used_tokens <= capacity);
            }
        }
    }
}
