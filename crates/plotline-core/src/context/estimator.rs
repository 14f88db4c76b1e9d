//! Token length estimation per prompt family.
//!
//! Exact tokenization is a backend concern; this module only needs a
//! deterministic, conservative approximation. Estimates err high: byte
//! length (not char count) is divided by a family-specific ratio and the
//! result is floored at the whitespace word count.
//!
//! Both inputs only grow when text is appended, so the estimate of a prefix
//! never exceeds the estimate of the whole. Truncation relies on this.

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use plotline_types::generation::PromptFamily;

/// Texts shorter than this are estimated directly; hashing would cost more.
const CACHE_MIN_BYTES: usize = 256;

/// Average bytes per token for each family's tokenizer.
fn bytes_per_token(family: PromptFamily) -> f64 {
    match family {
        PromptFamily::Tagged => 3.5,
        PromptFamily::Markdown => 4.0,
        PromptFamily::Plain => 3.2,
    }
}

/// Uncached estimate of `text` under `family`.
pub fn approximate_tokens(text: &str, family: PromptFamily) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let by_bytes = (text.len() as f64 / bytes_per_token(family)).ceil() as u32;
    let words = text.split_whitespace().count() as u32;
    by_bytes.max(words)
}

/// Estimate that holds for every family (the maximum across them).
pub fn conservative_tokens(text: &str) -> u32 {
    PromptFamily::ALL
        .iter()
        .map(|family| approximate_tokens(text, *family))
        .max()
        .unwrap_or(0)
}

/// Family-aware token estimator with an append-only estimate cache.
///
/// The cache is keyed by the SHA-256 of the text and is safe to share across
/// concurrent requests.
#[derive(Debug, Default)]
pub struct TokenEstimator {
    cache: DashMap<(PromptFamily, [u8; 32]), u32>,
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the token length of `text` for a backend family.
    pub fn estimate(&self, text: &str, family: PromptFamily) -> u32 {
        if text.len() < CACHE_MIN_BYTES {
            return approximate_tokens(text, family);
        }

        let key = (family, Sha256::digest(text.as_bytes()).into());
        if let Some(hit) = self.cache.get(&key) {
            return *hit;
        }
        let estimate = approximate_tokens(text, family);
        self.cache.insert(key, estimate);
        estimate
    }

    /// Family-agnostic estimate, used when blocks are created before a
    /// target backend is known.
    pub fn estimate_conservative(&self, text: &str) -> u32 {
        PromptFamily::ALL
            .iter()
            .map(|family| self.estimate(text, *family))
            .max()
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
