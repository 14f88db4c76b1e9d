//! Fluent construction of generation requests.
//!
//! Host code gathers facts from its own stores (identity, recent events,
//! scene) and hands them over as blocks. The builder fills in token
//! estimates, applies the use case's canonical output shape, and assigns a
//! time-ordered request id.

use uuid::Uuid;

use plotline_types::generation::{ContentBlock, GenerationRequest, Priority, UseCase};
use plotline_types::shape::OutputShape;

use super::estimator::{TokenEstimator, conservative_tokens};

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    use_case: UseCase,
    blocks: Vec<ContentBlock>,
    expected_shape: Option<OutputShape>,
    desired_count: Option<u32>,
}

impl RequestBuilder {
    pub fn new(use_case: UseCase) -> Self {
        Self {
            use_case,
            blocks: Vec::new(),
            expected_shape: None,
            desired_count: None,
        }
    }

    /// Append a stand-alone block.
    pub fn block(mut self, label: impl Into<String>, text: impl Into<String>, priority: Priority) -> Self {
        let text = text.into();
        let approx = conservative_tokens(&text);
        self.blocks.push(ContentBlock::new(label, text, priority, approx));
        self
    }

    /// Append one item of a chronological sequence. Call oldest first.
    pub fn sequence_item(
        mut self,
        sequence: &str,
        label: impl Into<String>,
        text: impl Into<String>,
        priority: Priority,
    ) -> Self {
        let text = text.into();
        let approx = conservative_tokens(&text);
        self.blocks
            .push(ContentBlock::new(label, text, priority, approx).in_sequence(sequence));
        self
    }

    /// Number of results requested, where the shape is an array.
    pub fn desired_count(mut self, count: u32) -> Self {
        self.desired_count = Some(count);
        self
    }

    /// Override the use case's canonical shape.
    pub fn expected_shape(mut self, shape: OutputShape) -> Self {
        self.expected_shape = Some(shape);
        self
    }

    pub fn build(self) -> GenerationRequest {
        GenerationRequest {
            id: Uuid::now_v7(),
            expected_shape: self
                .expected_shape
                .unwrap_or_else(|| self.use_case.default_shape()),
            use_case: self.use_case,
            blocks: self.blocks,
            desired_count: self.desired_count,
        }
    }
}

/// Fill in missing (zero) estimates, e.g. on requests read from JSON.
pub fn annotate(request: &mut GenerationRequest, estimator: &TokenEstimator) {
    for block in &mut request.blocks {
        if block.approx_tokens() == 0 && !block.text().is_empty() {
            *block = block.with_estimate(estimator.estimate_conservative(block.text()));
        }
    }
}
