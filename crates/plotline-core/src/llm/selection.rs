//! Deterministic candidate ordering per (use case, intensity tier).
//!
//! Every cell of the routing table is computed once when the strategy is
//! built. A cell lists the backends whose `max_permitted_tier` covers the
//! tier, ordered by:
//!
//! 1. position in the configured route for that cell, if any
//! 2. quality, descending
//! 3. cost rank, ascending
//! 4. identifier, ascending
//!
//! Lookups are then a pure table read, so the same inputs always produce
//! the same ordered list.

use std::collections::HashMap;

use plotline_types::config::RouteConfig;
use plotline_types::generation::{BackendDescriptor, IntensityTier, UseCase};

use super::registry::BackendRegistry;

/// Precomputed candidate lists for every (use case, tier) pair.
#[derive(Debug, Clone)]
pub struct ProviderSelectionStrategy {
    table: HashMap<(UseCase, IntensityTier), Vec<BackendDescriptor>>,
}

impl ProviderSelectionStrategy {
    pub fn new(registry: &BackendRegistry, routes: &[RouteConfig]) -> Self {
        let descriptors: Vec<&BackendDescriptor> = registry.descriptors().collect();
        let mut table = HashMap::with_capacity(UseCase::ALL.len() * IntensityTier::ALL.len());

        for use_case in UseCase::ALL {
            for tier in IntensityTier::ALL {
                let preferred: Vec<&str> = routes
                    .iter()
                    .filter(|r| r.use_case == use_case && r.tier == tier)
                    .flat_map(|r| r.prefer.iter().map(String::as_str))
                    .collect();

                let rank = |id: &str| {
                    preferred
                        .iter()
                        .position(|p| *p == id)
                        .unwrap_or(usize::MAX)
                };

                let mut candidates: Vec<BackendDescriptor> = descriptors
                    .iter()
                    .filter(|d| d.permits(tier))
                    .map(|d| (*d).clone())
                    .collect();

                candidates.sort_by(|a, b| {
                    rank(&a.identifier)
                        .cmp(&rank(&b.identifier))
                        .then_with(|| b.quality.cmp(&a.quality))
                        .then_with(|| a.cost_rank.cmp(&b.cost_rank))
                        .then_with(|| a.identifier.cmp(&b.identifier))
                });

                table.insert((use_case, tier), candidates);
            }
        }

        Self { table }
    }

    /// Ordered candidates for a request. May be empty.
    pub fn select(&self, use_case: UseCase, tier: IntensityTier) -> &[BackendDescriptor] {
        self.table
            .get(&(use_case, tier))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
