//! Backend health tracking across requests.
//!
//! Counters and last-error bookkeeping per backend, plus quarantine: once a
//! backend returns `Fatal` (bad credentials, unknown model), later requests
//! skip it without I/O until the process restarts. Transient failures only
//! move a backend to `Degraded`; the next success restores it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use plotline_types::outcome::AttemptOutcome;

/// Health state for a single backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    /// Recent non-fatal failures. Still eligible.
    Degraded { consecutive_failures: u32 },
    /// Fatal failure observed. Skipped by every later request.
    Quarantined { reason: String, since: DateTime<Utc> },
}

/// Health tracking for a single backend.
#[derive(Debug, Clone)]
pub struct BackendHealth {
    pub identifier: String,
    pub state: HealthState,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    pub total_calls: u64,
    pub total_failures: u64,
}

impl BackendHealth {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            state: HealthState::Healthy,
            last_error: None,
            last_success: None,
            last_latency_ms: None,
            total_calls: 0,
            total_failures: 0,
        }
    }

    /// Fold one attempt outcome into this backend's state.
    pub fn record(&mut self, outcome: &AttemptOutcome, latency_ms: u64) {
        self.total_calls += 1;
        self.last_latency_ms = Some(latency_ms);

        if outcome.is_success() {
            self.last_success = Some(Utc::now());
            if !matches!(self.state, HealthState::Quarantined { .. }) {
                self.state = HealthState::Healthy;
            }
            return;
        }

        self.total_failures += 1;
        self.last_error = Some(outcome.to_string());

        self.state = match (&self.state, outcome) {
            (HealthState::Quarantined { .. }, _) => return,
            (_, AttemptOutcome::Fatal { reason }) => HealthState::Quarantined {
                reason: reason.clone(),
                since: Utc::now(),
            },
            (HealthState::Degraded { consecutive_failures }, _) => HealthState::Degraded {
                consecutive_failures: consecutive_failures + 1,
            },
            (HealthState::Healthy, _) => HealthState::Degraded {
                consecutive_failures: 1,
            },
        };
    }

    pub fn quarantine_reason(&self) -> Option<&str> {
        match &self.state {
            HealthState::Quarantined { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Convert to a [`BackendStatus`] for CLI display.
    pub fn to_status(&self) -> BackendStatus {
        let state = match &self.state {
            HealthState::Healthy => "healthy",
            HealthState::Degraded { .. } => "degraded",
            HealthState::Quarantined { .. } => "quarantined",
        };
        BackendStatus {
            identifier: self.identifier.clone(),
            state: state.to_string(),
            last_error: self.last_error.clone(),
            last_success: self.last_success.map(|t| t.to_rfc3339()),
            last_latency_ms: self.last_latency_ms,
            total_calls: self.total_calls,
            total_failures: self.total_failures,
        }
    }
}

/// Serializable health summary of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub identifier: String,
    pub state: String,
    pub last_error: Option<String>,
    pub last_success: Option<String>,
    pub last_latency_ms: Option<u64>,
    pub total_calls: u64,
    pub total_failures: u64,
}

/// Concurrent health map shared by all in-flight requests.
#[derive(Debug, Default)]
pub struct HealthBoard {
    backends: DashMap<String, BackendHealth>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, identifier: &str, outcome: &AttemptOutcome, latency_ms: u64) {
        let mut entry = self
            .backends
            .entry(identifier.to_string())
            .or_insert_with(|| BackendHealth::new(identifier));
        entry.record(outcome, latency_ms);

        if let AttemptOutcome::Fatal { reason } = outcome {
            tracing::error!(backend = %identifier, %reason, "Backend quarantined");
        }
    }

    /// Why this backend is quarantined, if it is.
    pub fn quarantine_reason(&self, identifier: &str) -> Option<String> {
        self.backends
            .get(identifier)
            .and_then(|h| h.quarantine_reason().map(str::to_string))
    }

    /// Status of every backend that has been called, sorted by identifier.
    pub fn snapshot(&self) -> Vec<BackendStatus> {
        let mut statuses: Vec<BackendStatus> =
            self.backends.iter().map(|h| h.to_status()).collect();
        statuses.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        statuses
    }
}
