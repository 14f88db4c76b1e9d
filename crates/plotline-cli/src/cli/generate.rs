//! `plotline generate`: run one request end to end.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use tokio_util::sync::CancellationToken;

use plotline_core::generation::orchestrator::ResilientGenerationOrchestrator;
use plotline_core::llm::health::BackendStatus;
use plotline_types::outcome::GenerationResult;

use crate::console_input::ConsoleChannel;
use crate::request_file::load_request;
use crate::state::AppState;

/// Run the request. Returns the result so the caller can choose an exit code.
///
/// Ctrl+C outside manual input cancels the request; inside manual input the
/// readline interrupt does the same.
pub async fn generate(
    state: &AppState,
    request_path: &Path,
    output: Option<&Path>,
    quiet: bool,
) -> Result<GenerationResult> {
    let request = load_request(request_path).await?;
    let orchestrator =
        ResilientGenerationOrchestrator::new(&state.config, state.registry.clone(), ConsoleChannel::new());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let result = orchestrator.generate(request, &cancel).await;
    watcher.abort();

    let rendered = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => tokio::fs::write(path, &rendered)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }

    if !quiet {
        report(&result);
        report_health(&orchestrator.health_snapshot());
    }
    Ok(result)
}

fn report(result: &GenerationResult) {
    for attempt in &result.attempts {
        eprintln!(
            "  {} {} {}",
            style("-").dim(),
            style(&attempt.backend).cyan(),
            style(&attempt.outcome).dim()
        );
    }
    match &result.source {
        Some(source) => eprintln!(
            "  {} Result from {} after {} attempt(s)",
            style("✓").green(),
            style(source).bold(),
            result.attempts.len()
        ),
        None => eprintln!("  {} Generation aborted", style("✗").red()),
    }
}

/// Backends this run left degraded or quarantined.
fn report_health(statuses: &[BackendStatus]) {
    for status in statuses.iter().filter(|s| s.state != "healthy") {
        let state = if status.state == "quarantined" {
            style(&status.state).red()
        } else {
            style(&status.state).yellow()
        };
        eprintln!(
            "  {} {} {} ({}/{} failed){}",
            style("!").yellow().bold(),
            style(&status.identifier).cyan(),
            state,
            status.total_failures,
            status.total_calls,
            status
                .last_error
                .as_deref()
                .map(|e| format!(": {e}"))
                .unwrap_or_default()
        );
    }
}
