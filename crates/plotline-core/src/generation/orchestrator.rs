//! The resilient generation loop.
//!
//! One call to [`ResilientGenerationOrchestrator::generate`] drives a request
//! through these states:
//!
//! ```text
//! Classifying -> Selecting -> Attempting(0) -> Validating(0) -> Succeeded
//!                                  |  ^ same-candidate retry on Transient
//!                                  v
//!                             Attempting(1) -> ... -> Exhausted -> ManualFallback -> Succeeded
//! ```
//!
//! Any state can move to `Aborted`, but only through caller cancellation,
//! which is checked between attempts. Backend failures never abort: once
//! every candidate is spent, a human supplies the result.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span};

use plotline_types::config::PlotlineConfig;
use plotline_types::generation::{BackendDescriptor, ContentBlock, GenerationRequest};
use plotline_types::outcome::{
    AttemptOutcome, AttemptRecord, GenerationResult, MANUAL_SOURCE, ResultSource,
};

use super::manual::{ManualChannel, ManualFallbackHandler, ManualRequest, context_summary};
use super::output::parse_output;
use crate::context::allocator::{Allocation, ContextBudgetAllocator};
use crate::context::classifier::{ContentClassifier, IntensityAssessment};
use crate::context::estimator::TokenEstimator;
use crate::llm::health::{BackendStatus, HealthBoard};
use crate::llm::registry::BackendRegistry;
use crate::llm::selection::ProviderSelectionStrategy;
use crate::prompt::{FormattedPrompt, PromptFormatter};

/// Position of a request in the generation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Classifying,
    Selecting,
    Attempting(usize),
    Validating(usize),
    Exhausted,
    ManualFallback,
    Succeeded,
    Aborted,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationState::Classifying => write!(f, "classifying"),
            GenerationState::Selecting => write!(f, "selecting"),
            GenerationState::Attempting(i) => write!(f, "attempting({i})"),
            GenerationState::Validating(i) => write!(f, "validating({i})"),
            GenerationState::Exhausted => write!(f, "exhausted"),
            GenerationState::ManualFallback => write!(f, "manual_fallback"),
            GenerationState::Succeeded => write!(f, "succeeded"),
            GenerationState::Aborted => write!(f, "aborted"),
        }
    }
}

fn enter(state: GenerationState) {
    tracing::debug!(%state, "Generation state");
}

/// Extra allocation passes when rendered framing outgrows its estimate.
const MAX_REFITS: u32 = 2;

/// Loop tuning taken from configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub response_headroom: f64,
    pub transient_retries: u32,
    pub transient_backoff: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &PlotlineConfig) -> Self {
        Self {
            response_headroom: config.effective_headroom(),
            transient_retries: config.transient_retries,
            transient_backoff: Duration::from_millis(config.transient_backoff_ms),
        }
    }
}

/// What one candidate would receive, computed without any I/O.
#[derive(Debug, Clone)]
pub struct PlannedAttempt {
    pub descriptor: BackendDescriptor,
    pub reserved_tokens: u32,
    pub allocation: Allocation,
    pub prompt: FormattedPrompt,
    /// Estimate of the rendered system and user text together.
    pub prompt_tokens: u32,
    /// Set when an earlier fatal error has taken this backend out of service.
    pub quarantined: Option<String>,
}

/// Dry-run view of a request: its classification and per-candidate prompts.
#[derive(Debug, Clone)]
pub struct GenerationPlan {
    pub assessment: IntensityAssessment,
    pub candidates: Vec<PlannedAttempt>,
}

/// A candidate's fitted and rendered prompt.
struct Prepared {
    reserved: u32,
    allocation: Allocation,
    prompt: FormattedPrompt,
    prompt_tokens: u32,
}

enum Step {
    Value(Value),
    Next,
    Cancelled,
}

/// Drives requests through classification, selection, attempts, and manual
/// fallback.
///
/// Shared state across requests is limited to the immutable registry, the
/// estimate cache, and the health board, so one orchestrator can serve
/// concurrent requests.
pub struct ResilientGenerationOrchestrator<C> {
    registry: Arc<BackendRegistry>,
    strategy: ProviderSelectionStrategy,
    classifier: ContentClassifier,
    allocator: ContextBudgetAllocator,
    estimator: Arc<TokenEstimator>,
    health: HealthBoard,
    manual: ManualFallbackHandler<C>,
    settings: OrchestratorSettings,
}

impl<C: ManualChannel> ResilientGenerationOrchestrator<C> {
    pub fn new(config: &PlotlineConfig, registry: Arc<BackendRegistry>, channel: C) -> Self {
        let estimator = Arc::new(TokenEstimator::new());
        Self {
            strategy: ProviderSelectionStrategy::new(&registry, &config.routes),
            classifier: ContentClassifier::new(&config.classifier),
            allocator: ContextBudgetAllocator::from_config(estimator.clone(), config),
            estimator,
            health: HealthBoard::new(),
            manual: ManualFallbackHandler::new(channel),
            settings: OrchestratorSettings::from_config(config),
            registry,
        }
    }

    /// Health of every backend called so far.
    pub fn health_snapshot(&self) -> Vec<BackendStatus> {
        self.health.snapshot()
    }

    /// Classify, select, and render prompts for every candidate without
    /// invoking anything.
    pub fn plan(&self, request: &GenerationRequest) -> GenerationPlan {
        let assessment = self.classifier.assess(&request.blocks);
        let candidates = self
            .strategy
            .select(request.use_case, assessment.tier)
            .iter()
            .map(|descriptor| {
                let prepared = self.prepare(request, descriptor);
                PlannedAttempt {
                    descriptor: descriptor.clone(),
                    reserved_tokens: prepared.reserved,
                    allocation: prepared.allocation,
                    prompt: prepared.prompt,
                    prompt_tokens: prepared.prompt_tokens,
                    quarantined: self.health.quarantine_reason(&descriptor.identifier),
                }
            })
            .collect();
        GenerationPlan {
            assessment,
            candidates,
        }
    }

    /// Produce a result for `request`.
    ///
    /// Always returns a value unless `cancel` fires, in which case the
    /// result carries only the attempts made so far.
    pub async fn generate(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        let span = info_span!(
            "generation",
            request_id = %request.id,
            use_case = %request.use_case,
            tier = tracing::field::Empty,
        );
        self.run(request, cancel).instrument(span).await
    }

    async fn run(&self, request: GenerationRequest, cancel: &CancellationToken) -> GenerationResult {
        let mut attempts = Vec::new();
        if cancel.is_cancelled() {
            return aborted(attempts);
        }

        enter(GenerationState::Classifying);
        let tier = self.classifier.classify(&request.blocks);
        tracing::Span::current().record("tier", tracing::field::display(tier));

        enter(GenerationState::Selecting);
        let candidates = self.strategy.select(request.use_case, tier);
        tracing::debug!(
            candidates = candidates.len(),
            registered = self.registry.len(),
            "Selected candidates"
        );

        if candidates.is_empty() {
            // Record why each registered backend was passed over.
            for descriptor in self.registry.descriptors() {
                attempts.push(AttemptRecord {
                    backend: descriptor.identifier.clone(),
                    outcome: AttemptOutcome::refused(format!(
                        "intensity tier {tier} exceeds backend limit {}",
                        descriptor.max_permitted_tier
                    )),
                    started_at: Utc::now(),
                    latency_ms: 0,
                });
            }
        }

        for (index, descriptor) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return aborted(attempts);
            }
            enter(GenerationState::Attempting(index));

            match self
                .attempt(index, &request, descriptor, cancel, &mut attempts)
                .await
            {
                Step::Value(value) => {
                    enter(GenerationState::Succeeded);
                    tracing::info!(
                        backend = %descriptor.identifier,
                        attempts = attempts.len(),
                        "Generation succeeded"
                    );
                    return GenerationResult::succeeded(
                        value,
                        ResultSource::Backend(descriptor.identifier.clone()),
                        attempts,
                    );
                }
                Step::Next => {}
                Step::Cancelled => return aborted(attempts),
            }
        }

        enter(GenerationState::Exhausted);
        if cancel.is_cancelled() {
            return aborted(attempts);
        }
        tracing::warn!(
            attempts = attempts.len(),
            "All backends exhausted, falling back to manual input"
        );

        enter(GenerationState::ManualFallback);
        self.manual_fallback(&request, cancel, attempts).await
    }

    /// Try one candidate, retrying it only after `Transient` outcomes.
    async fn attempt(
        &self,
        index: usize,
        request: &GenerationRequest,
        descriptor: &BackendDescriptor,
        cancel: &CancellationToken,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Step {
        let id = &descriptor.identifier;

        if let Some(reason) = self.health.quarantine_reason(id) {
            tracing::debug!(backend = %id, "Skipping quarantined backend");
            attempts.push(AttemptRecord {
                backend: id.clone(),
                outcome: AttemptOutcome::fatal(format!("quarantined: {reason}")),
                started_at: Utc::now(),
                latency_ms: 0,
            });
            return Step::Next;
        }

        let Some(backend) = self.registry.get(id) else {
            attempts.push(AttemptRecord {
                backend: id.clone(),
                outcome: AttemptOutcome::fatal("backend is not registered"),
                started_at: Utc::now(),
                latency_ms: 0,
            });
            return Step::Next;
        };

        let Prepared {
            allocation, prompt, ..
        } = self.prepare(request, descriptor);
        if allocation.overflowed() {
            tracing::warn!(
                backend = %id,
                overflow_tokens = allocation.overflow_tokens(),
                "Critical context exceeds backend budget; sending anyway"
            );
        }
        if !allocation.dropped_labels.is_empty() || allocation.was_truncated {
            tracing::debug!(
                backend = %id,
                dropped = ?allocation.dropped_labels,
                truncated = ?allocation.truncated_labels,
                "Context trimmed for backend"
            );
        }

        let retries = self.settings.transient_retries;
        for try_number in 0..=retries {
            let started_at = Utc::now();
            let start = Instant::now();

            let span = info_span!(
                "gen_ai.invoke",
                gen_ai.system = backend.adapter.name(),
                gen_ai.request.model = %descriptor.model,
                gen_ai.request.max_tokens = descriptor.max_output_tokens,
                backend = %id,
                try_number,
            );
            let raw = backend.adapter.invoke(&prompt, descriptor).instrument(span).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            let (outcome, value) = match raw {
                AttemptOutcome::Success { raw_text } => {
                    enter(GenerationState::Validating(index));
                    match parse_output(&raw_text, &request.expected_shape, request.desired_count) {
                        Ok(value) => (AttemptOutcome::Success { raw_text }, Some(value)),
                        Err(violations) => (
                            AttemptOutcome::malformed(raw_text, violations.to_string()),
                            None,
                        ),
                    }
                }
                other => (other, None),
            };

            self.health.record(id, &outcome, latency_ms);
            if value.is_none() {
                tracing::warn!(backend = %id, latency_ms, %outcome, "Attempt failed");
            }

            let retry = matches!(outcome, AttemptOutcome::Transient { .. }) && try_number < retries;
            attempts.push(AttemptRecord {
                backend: id.clone(),
                outcome,
                started_at,
                latency_ms,
            });

            if let Some(value) = value {
                return Step::Value(value);
            }
            if !retry {
                return Step::Next;
            }

            tracing::debug!(
                backend = %id,
                backoff_ms = self.settings.transient_backoff.as_millis() as u64,
                "Retrying after transient failure"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Step::Cancelled,
                _ = tokio::time::sleep(self.settings.transient_backoff) => {}
            }
        }

        Step::Next
    }

    async fn manual_fallback(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        mut attempts: Vec<AttemptRecord>,
    ) -> GenerationResult {
        let summary = context_summary(&request.blocks);
        let started_at = Utc::now();
        let start = Instant::now();

        let collected = {
            let manual_request = ManualRequest {
                use_case: request.use_case,
                shape: &request.expected_shape,
                desired_count: request.desired_count,
                context_summary: &summary,
                attempted: &attempts,
            };
            tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.manual.collect(manual_request) => Some(result),
            }
        };

        match collected {
            Some(Ok(value)) => {
                attempts.push(AttemptRecord {
                    backend: MANUAL_SOURCE.to_string(),
                    outcome: AttemptOutcome::Success {
                        raw_text: value.to_string(),
                    },
                    started_at,
                    latency_ms: start.elapsed().as_millis() as u64,
                });
                enter(GenerationState::Succeeded);
                GenerationResult::succeeded(value, ResultSource::Manual, attempts)
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "Manual input ended without a result");
                aborted(attempts)
            }
            None => aborted(attempts),
        }
    }

    /// Size, fit, and render the prompt for one candidate.
    ///
    /// The block budget is what remains of `capacity - reserved` after the
    /// system text and the framing around every block. Framing is measured
    /// on a skeleton render with empty block texts; if the real render still
    /// comes out over budget, the excess is added and blocks are refitted.
    fn prepare(&self, request: &GenerationRequest, descriptor: &BackendDescriptor) -> Prepared {
        let family = descriptor.family;
        let capacity = descriptor.capacity_tokens;
        let reserved = (f64::from(capacity) * self.settings.response_headroom).ceil() as u32;
        let available = capacity.saturating_sub(reserved);

        let render = |blocks: &[ContentBlock]| {
            PromptFormatter::format(
                request.use_case,
                &request.expected_shape,
                blocks,
                family,
                request.desired_count,
            )
        };

        let skeleton: Vec<ContentBlock> = request
            .blocks
            .iter()
            .map(|b| b.truncated(String::new(), 0))
            .collect();
        let mut overhead = self.prompt_tokens(&render(&skeleton));

        let mut refits = 0;
        loop {
            let allocation =
                self.allocator
                    .allocate(&request.blocks, capacity, reserved.saturating_add(overhead), family);
            let prompt = render(&allocation.fitted);
            let prompt_tokens = self.prompt_tokens(&prompt);
            let excess = prompt_tokens.saturating_sub(available);

            if excess == 0 || allocation.overflowed() || refits == MAX_REFITS {
                if excess > 0 {
                    tracing::debug!(
                        backend = %descriptor.identifier,
                        prompt_tokens,
                        available,
                        "Prompt exceeds input budget"
                    );
                }
                return Prepared {
                    reserved,
                    allocation,
                    prompt,
                    prompt_tokens,
                };
            }
            overhead += excess;
            refits += 1;
        }
    }

    fn prompt_tokens(&self, prompt: &FormattedPrompt) -> u32 {
        self.estimator.estimate(&prompt.system, prompt.family)
            + self.estimator.estimate(&prompt.user, prompt.family)
    }
}

fn aborted(attempts: Vec<AttemptRecord>) -> GenerationResult {
    enter(GenerationState::Aborted);
    tracing::info!(attempts = attempts.len(), "Generation aborted by caller");
    GenerationResult::aborted(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use plotline_types::generation::{IntensityTier, Priority, PromptFamily, UseCase};
    use plotline_types::shape::OutputShape;
    use serde_json::json;

    use crate::context::builder::RequestBuilder;
    use crate::generation::manual::InputEvent;
    use crate::generation::manual::tests::ScriptedChannel;
    use crate::llm::adapter::BackendAdapter;
    use crate::llm::box_adapter::BoxBackendAdapter;

    // --- Mock adapter ---

    struct ScriptedAdapter {
        script: Mutex<VecDeque<AttemptOutcome>>,
        calls: Arc<AtomicUsize>,
        prompts: Arc<Mutex<Vec<FormattedPrompt>>>,
    }

    impl BackendAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            "scripted"
        }

        fn invoke(
            &self,
            prompt: &FormattedPrompt,
            _descriptor: &BackendDescriptor,
        ) -> impl Future<Output = AttemptOutcome> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.clone());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| AttemptOutcome::fatal("script exhausted"));
            async move { next }
        }
    }

    struct Probe {
        calls: Arc<AtomicUsize>,
        prompts: Arc<Mutex<Vec<FormattedPrompt>>>,
    }

    impl Probe {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn descriptor(id: &str, tier: IntensityTier, quality: u32, capacity: u32, family: PromptFamily) -> BackendDescriptor {
        BackendDescriptor {
            identifier: id.to_string(),
            family,
            model: format!("{id}-model"),
            capacity_tokens: capacity,
            max_output_tokens: 512,
            max_permitted_tier: tier,
            quality,
            cost_rank: 1,
        }
    }

    fn config() -> PlotlineConfig {
        PlotlineConfig {
            transient_backoff_ms: 0,
            backends: Vec::new(),
            ..PlotlineConfig::default()
        }
    }

    fn orchestrator(
        backends: Vec<(BackendDescriptor, Vec<AttemptOutcome>)>,
        channel: ScriptedChannel,
    ) -> (ResilientGenerationOrchestrator<ScriptedChannel>, Vec<Probe>) {
        orchestrator_with(config(), backends, channel)
    }

    fn orchestrator_with(
        config: PlotlineConfig,
        backends: Vec<(BackendDescriptor, Vec<AttemptOutcome>)>,
        channel: ScriptedChannel,
    ) -> (ResilientGenerationOrchestrator<ScriptedChannel>, Vec<Probe>) {
        let mut builder = BackendRegistry::builder();
        let mut probes = Vec::new();
        for (desc, script) in backends {
            let calls = Arc::new(AtomicUsize::new(0));
            let prompts = Arc::new(Mutex::new(Vec::new()));
            probes.push(Probe {
                calls: calls.clone(),
                prompts: prompts.clone(),
            });
            let adapter = ScriptedAdapter {
                script: Mutex::new(script.into()),
                calls,
                prompts,
            };
            builder = builder.register(desc, BoxBackendAdapter::new(adapter)).unwrap();
        }
        let registry = Arc::new(builder.build());
        (ResilientGenerationOrchestrator::new(&config, registry, channel), probes)
    }

    fn summary_request(text: &str) -> GenerationRequest {
        RequestBuilder::new(UseCase::MemorySummary)
            .block("character_identity", "Mara, a smuggler with debts.", Priority::Critical)
            .block("recent_events", text, Priority::High)
            .build()
    }

    fn valid_summary() -> AttemptOutcome {
        AttemptOutcome::Success {
            raw_text: json!({"summary": "Mara slipped away.", "key_events": ["escape"]}).to_string(),
        }
    }

    fn manual_summary_lines() -> ScriptedChannel {
        ScriptedChannel::lines(&[r#"{"summary": "Typed by hand.", "key_events": []}"#, "END"])
    }

    #[tokio::test]
    async fn test_refusal_falls_through_to_next_backend() {
        let (orch, probes) = orchestrator(
            vec![
                (
                    descriptor("first", IntensityTier::Mature, 90, 8_192, PromptFamily::Tagged),
                    vec![AttemptOutcome::refused("content policy")],
                ),
                (
                    descriptor("second", IntensityTier::Mature, 80, 8_192, PromptFamily::Markdown),
                    vec![valid_summary()],
                ),
            ],
            ScriptedChannel::new(vec![]),
        );

        let result = orch
            .generate(summary_request("The patrol passed."), &CancellationToken::new())
            .await;

        assert_eq!(result.source, Some(ResultSource::Backend("second".into())));
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.attempts[0].backend, "first");
        assert_eq!(result.attempts[0].outcome.kind(), "refused");
        assert!(result.attempts[1].outcome.is_success());
        assert_eq!(probes[0].calls(), 1, "refusals are not retried");
        assert_eq!(result.value.unwrap()["key_events"][0], "escape");
    }

    #[tokio::test]
    async fn test_empty_registry_goes_straight_to_manual() {
        let channel = manual_summary_lines();
        let presented = channel.presented.clone();
        let (orch, _) = orchestrator(vec![], channel);

        let result = orch
            .generate(summary_request("Quiet night."), &CancellationToken::new())
            .await;

        assert!(result.is_manual());
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.attempts[0].backend, MANUAL_SOURCE);
        let header = presented.lock().unwrap()[0].clone();
        assert!(header.contains("No backends are configured."));
    }

    #[tokio::test]
    async fn test_transient_retried_once_on_same_backend() {
        let (orch, probes) = orchestrator(
            vec![(
                descriptor("flaky", IntensityTier::Mature, 90, 8_192, PromptFamily::Tagged),
                vec![AttemptOutcome::transient("HTTP 429"), valid_summary()],
            )],
            ScriptedChannel::new(vec![]),
        );

        let result = orch
            .generate(summary_request("Rain."), &CancellationToken::new())
            .await;

        assert_eq!(result.source, Some(ResultSource::Backend("flaky".into())));
        assert_eq!(probes[0].calls(), 2);
        let kinds: Vec<&str> = result.attempts.iter().map(|a| a.outcome.kind()).collect();
        assert_eq!(kinds, vec!["transient", "success"]);
    }

    #[tokio::test]
    async fn test_transient_retry_bounded_then_advance() {
        let (orch, probes) = orchestrator(
            vec![
                (
                    descriptor("down", IntensityTier::Mature, 90, 8_192, PromptFamily::Tagged),
                    vec![
                        AttemptOutcome::transient("timeout"),
                        AttemptOutcome::transient("timeout"),
                        valid_summary(),
                    ],
                ),
                (
                    descriptor("up", IntensityTier::Mature, 50, 8_192, PromptFamily::Plain),
                    vec![valid_summary()],
                ),
            ],
            ScriptedChannel::new(vec![]),
        );

        let result = orch
            .generate(summary_request("Rain."), &CancellationToken::new())
            .await;

        assert_eq!(probes[0].calls(), 2);
        assert_eq!(probes[1].calls(), 1);
        assert_eq!(result.source, Some(ResultSource::Backend("up".into())));
        assert_eq!(result.attempts.len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_output_advances() {
        let (orch, _) = orchestrator(
            vec![
                (
                    descriptor("sloppy", IntensityTier::Mature, 90, 8_192, PromptFamily::Tagged),
                    vec![AttemptOutcome::Success {
                        raw_text: "Here is a summary: Mara left.".into(),
                    }],
                ),
                (
                    descriptor("careful", IntensityTier::Mature, 80, 8_192, PromptFamily::Tagged),
                    vec![valid_summary()],
                ),
            ],
            ScriptedChannel::new(vec![]),
        );

        let result = orch
            .generate(summary_request("Rain."), &CancellationToken::new())
            .await;

        match &result.attempts[0].outcome {
            AttemptOutcome::MalformedOutput {
                raw_text,
                validation_error,
            } => {
                assert_eq!(raw_text, "Here is a summary: Mara left.");
                assert!(validation_error.contains("invalid JSON"));
            }
            other => panic!("expected malformed output, got {other:?}"),
        }
        assert_eq!(result.source, Some(ResultSource::Backend("careful".into())));
    }

    #[tokio::test]
    async fn test_all_fatal_routes_to_manual_every_time() {
        let channel = ScriptedChannel::lines(&[
            r#"{"summary": "One.", "key_events": []}"#,
            "END",
            r#"{"summary": "Two.", "key_events": []}"#,
            "END",
        ]);
        let (orch, probes) = orchestrator(
            vec![
                (
                    descriptor("a", IntensityTier::Mature, 90, 8_192, PromptFamily::Tagged),
                    vec![AttemptOutcome::fatal("HTTP 401")],
                ),
                (
                    descriptor("b", IntensityTier::Mature, 80, 8_192, PromptFamily::Tagged),
                    vec![AttemptOutcome::fatal("HTTP 404: model not found")],
                ),
            ],
            channel,
        );

        let first = orch
            .generate(summary_request("Rain."), &CancellationToken::new())
            .await;
        assert!(first.is_manual());
        assert_eq!(first.value.as_ref().unwrap()["summary"], "One.");
        assert_eq!(first.attempts.len(), 3);

        let second = orch
            .generate(summary_request("Rain."), &CancellationToken::new())
            .await;
        assert!(second.is_manual());
        assert_eq!(second.value.as_ref().unwrap()["summary"], "Two.");
        // Quarantined backends are logged but not called again.
        assert_eq!(probes[0].calls(), 1);
        assert_eq!(probes[1].calls(), 1);
        match &second.attempts[0].outcome {
            AttemptOutcome::Fatal { reason } => assert!(reason.starts_with("quarantined: HTTP 401")),
            other => panic!("expected fatal, got {other:?}"),
        }

        let snapshot = orch.health_snapshot();
        assert!(snapshot.iter().all(|s| s.state == "quarantined"));
    }

    #[tokio::test]
    async fn test_intense_content_skips_restrictive_backend() {
        let (orch, probes) = orchestrator(
            vec![
                (
                    descriptor("prude", IntensityTier::Moderate, 99, 8_192, PromptFamily::Tagged),
                    vec![valid_summary()],
                ),
                (
                    descriptor("open", IntensityTier::Mature, 50, 8_192, PromptFamily::Plain),
                    vec![valid_summary()],
                ),
            ],
            ScriptedChannel::new(vec![]),
        );

        let result = orch
            .generate(
                summary_request("She stabbed him through the heart, killing him."),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(probes[0].calls(), 0);
        assert_eq!(result.source, Some(ResultSource::Backend("open".into())));
    }

    #[tokio::test]
    async fn test_no_eligible_backend_still_logs_attempts() {
        let (orch, probes) = orchestrator(
            vec![(
                descriptor("prude", IntensityTier::Mild, 99, 8_192, PromptFamily::Tagged),
                vec![valid_summary()],
            )],
            manual_summary_lines(),
        );

        let result = orch
            .generate(summary_request("The body was dismembered."), &CancellationToken::new())
            .await;

        assert_eq!(probes[0].calls(), 0);
        assert!(result.is_manual());
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.attempts[0].backend, "prude");
        assert_eq!(result.attempts[0].outcome.kind(), "refused");
    }

    #[tokio::test]
    async fn test_pre_cancelled_request_aborts_without_attempts() {
        let (orch, probes) = orchestrator(
            vec![(
                descriptor("a", IntensityTier::Mature, 90, 8_192, PromptFamily::Tagged),
                vec![valid_summary()],
            )],
            ScriptedChannel::new(vec![]),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orch.generate(summary_request("Rain."), &cancel).await;
        assert!(result.is_aborted());
        assert!(result.attempts.is_empty());
        assert_eq!(probes[0].calls(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_during_manual_aborts_with_log() {
        let (orch, _) = orchestrator(
            vec![(
                descriptor("a", IntensityTier::Mature, 90, 8_192, PromptFamily::Tagged),
                vec![AttemptOutcome::refused("no")],
            )],
            ScriptedChannel::new(vec![InputEvent::Interrupted]),
        );

        let result = orch
            .generate(summary_request("Rain."), &CancellationToken::new())
            .await;
        assert!(result.is_aborted());
        assert!(result.source.is_none());
        assert_eq!(result.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_prompt_sized_and_formatted_per_backend() {
        let long_history = "The caravan crossed the dunes for days. ".repeat(400);
        let request = RequestBuilder::new(UseCase::MemorySummary)
            .block("character_identity", "Mara, a smuggler with debts.", Priority::Critical)
            .block("history", long_history.clone(), Priority::Low)
            .build();

        let (orch, probes) = orchestrator(
            vec![
                (
                    descriptor("small", IntensityTier::Mature, 90, 2_048, PromptFamily::Plain),
                    vec![AttemptOutcome::transient("timeout"), AttemptOutcome::transient("timeout")],
                ),
                (
                    descriptor("large", IntensityTier::Mature, 80, 200_000, PromptFamily::Tagged),
                    vec![valid_summary()],
                ),
            ],
            ScriptedChannel::new(vec![]),
        );

        let result = orch.generate(request, &CancellationToken::new()).await;
        assert_eq!(result.source, Some(ResultSource::Backend("large".into())));

        let small_prompt = probes[0].prompts.lock().unwrap()[0].clone();
        let large_prompt = probes[1].prompts.lock().unwrap()[0].clone();
        assert_eq!(small_prompt.family, PromptFamily::Plain);
        assert_eq!(large_prompt.family, PromptFamily::Tagged);
        assert!(small_prompt.user.contains("Mara, a smuggler with debts."));
        assert!(!small_prompt.user.contains(long_history.trim_end()));
        assert!(large_prompt.user.contains(long_history.trim_end()));
    }

    #[tokio::test]
    async fn test_surplus_items_trimmed_to_desired_count() {
        let request = RequestBuilder::new(UseCase::ActionGeneration)
            .block("character_identity", "Mara, a smuggler.", Priority::Critical)
            .desired_count(1)
            .build();
        let raw = json!([
            {"thought": "a", "action": "run", "action_type": "move"},
            {"thought": "b", "action": "hide", "action_type": "wait"}
        ])
        .to_string();
        let (orch, _) = orchestrator(
            vec![(
                descriptor("a", IntensityTier::Mature, 90, 8_192, PromptFamily::Tagged),
                vec![AttemptOutcome::Success { raw_text: raw }],
            )],
            ScriptedChannel::new(vec![]),
        );

        let result = orch.generate(request, &CancellationToken::new()).await;
        let value = result.value.unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert!(OutputShape::action_options().validate(&value).is_ok());
    }

    #[test]
    fn test_plan_is_side_effect_free() {
        let (orch, probes) = orchestrator(
            vec![
                (
                    descriptor("a", IntensityTier::Mature, 90, 8_192, PromptFamily::Tagged),
                    vec![],
                ),
                (
                    descriptor("b", IntensityTier::Unrestricted, 50, 4_096, PromptFamily::Plain),
                    vec![],
                ),
            ],
            ScriptedChannel::new(vec![]),
        );

        let plan = orch.plan(&summary_request("A quiet evening."));
        assert_eq!(plan.assessment.tier, IntensityTier::Mild);
        assert_eq!(plan.candidates.len(), 2);
        assert_eq!(plan.candidates[0].descriptor.identifier, "a");
        assert_eq!(plan.candidates[1].reserved_tokens, 820);
        assert!(plan.candidates.iter().all(|c| c.quarantined.is_none()));
        assert_eq!(probes[0].calls(), 0);
    }

    #[test]
    fn test_rendered_prompt_fits_input_budget() {
        let scene = "Lanterns sway over the crowded market while guards push through. ".repeat(40);
        let memories = "She remembers the debt, the knife, and the harbor master. ".repeat(40);
        let request = RequestBuilder::new(UseCase::ActionGeneration)
            .block("character_identity", "Mara, a smuggler with debts.", Priority::Critical)
            .block("current_scene", scene, Priority::High)
            .block("memories", memories, Priority::Medium)
            .desired_count(3)
            .build();

        let (orch, _) = orchestrator(
            vec![
                (
                    descriptor("small", IntensityTier::Mature, 90, 2_048, PromptFamily::Plain),
                    vec![],
                ),
                (
                    descriptor("medium", IntensityTier::Mature, 80, 1_024, PromptFamily::Markdown),
                    vec![],
                ),
                (
                    descriptor("tagged", IntensityTier::Mature, 70, 1_536, PromptFamily::Tagged),
                    vec![],
                ),
            ],
            ScriptedChannel::new(vec![]),
        );

        let plan = orch.plan(&request);
        assert_eq!(plan.candidates.len(), 3);
        let estimator = TokenEstimator::new();
        for candidate in &plan.candidates {
            let family = candidate.descriptor.family;
            let sent = estimator.estimate(&candidate.prompt.system, family)
                + estimator.estimate(&candidate.prompt.user, family);
            let budget = candidate.descriptor.capacity_tokens - candidate.reserved_tokens;
            assert_eq!(sent, candidate.prompt_tokens);
            assert!(!candidate.allocation.overflowed());
            assert!(
                sent <= budget,
                "{}: {sent} tokens sent, {budget} available",
                candidate.descriptor.identifier
            );
            assert!(candidate.prompt.user.contains("Mara, a smuggler with debts."));
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(GenerationState::Attempting(2).to_string(), "attempting(2)");
        assert_eq!(GenerationState::ManualFallback.to_string(), "manual_fallback");
    }

    #[test]
    fn test_settings_from_config() {
        let settings = OrchestratorSettings::from_config(&PlotlineConfig {
            response_headroom: 0.9,
            ..PlotlineConfig::default()
        });
        assert!((settings.response_headroom - 0.5).abs() < f64::EPSILON);
        assert_eq!(settings.transient_retries, 1);
        assert_eq!(settings.transient_backoff, Duration::from_millis(500));
    }
}
