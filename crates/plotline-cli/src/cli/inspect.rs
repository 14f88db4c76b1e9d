//! `plotline inspect`: dry run of classification, selection, and fitting.

use std::path::Path;

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::json;

use plotline_core::generation::orchestrator::{GenerationPlan, PlannedAttempt, ResilientGenerationOrchestrator};

use crate::console_input::ConsoleChannel;
use crate::request_file::load_request;
use crate::state::AppState;

pub async fn inspect(state: &AppState, request_path: &Path, backend: Option<&str>, json: bool) -> Result<()> {
    let request = load_request(request_path).await?;
    let orchestrator =
        ResilientGenerationOrchestrator::new(&state.config, state.registry.clone(), ConsoleChannel::new());
    let plan = orchestrator.plan(&request);

    let shown: Vec<&PlannedAttempt> = match backend {
        Some(id) => {
            let Some(candidate) = plan.candidates.iter().find(|c| c.descriptor.identifier == id) else {
                bail!(
                    "backend '{id}' is not a candidate for tier {} (candidates: {})",
                    plan.assessment.tier,
                    candidate_list(&plan)
                );
            };
            vec![candidate]
        }
        None => plan.candidates.iter().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&plan, &shown))?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} (use case {})",
        style("Tier:").bold(),
        style(plan.assessment.tier).cyan(),
        request.use_case
    );
    if !plan.assessment.markers.is_empty() {
        let markers: Vec<String> = plan
            .assessment
            .markers
            .iter()
            .map(|(tier, marker)| format!("{marker} ({tier})"))
            .collect();
        println!("  {} {}", style("Markers:").bold(), markers.join(", "));
    }
    if plan.assessment.escalated {
        println!("  {}", style("Escalated by marker density.").yellow());
    }
    println!();

    if plan.candidates.is_empty() {
        println!(
            "  {} No backend accepts this tier; the request would go to manual input.",
            style("i").blue().bold()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Backend").fg(Color::White),
        Cell::new("Family").fg(Color::White),
        Cell::new("Budget").fg(Color::White),
        Cell::new("Used").fg(Color::White),
        Cell::new("Prompt").fg(Color::White),
        Cell::new("Dropped").fg(Color::White),
        Cell::new("Truncated").fg(Color::White),
    ]);
    for (index, candidate) in plan.candidates.iter().enumerate() {
        let alloc = &candidate.allocation;
        let used = if alloc.overflowed() {
            Cell::new(alloc.used_tokens).fg(Color::Red)
        } else {
            Cell::new(alloc.used_tokens).fg(Color::Green)
        };
        table.add_row(vec![
            Cell::new(index + 1).fg(Color::Cyan),
            Cell::new(&candidate.descriptor.identifier).fg(Color::White),
            Cell::new(candidate.descriptor.family.to_string()).fg(Color::DarkGrey),
            Cell::new(alloc.available_tokens).fg(Color::DarkGrey),
            used,
            Cell::new(candidate.prompt_tokens).fg(Color::DarkGrey),
            Cell::new(join_or_dash(&alloc.dropped_labels)).fg(Color::DarkGrey),
            Cell::new(join_or_dash(&alloc.truncated_labels)).fg(Color::DarkGrey),
        ]);
    }
    println!("{table}");

    for candidate in shown {
        println!();
        println!(
            "  {} {}",
            style("Prompt for").bold(),
            style(&candidate.descriptor.identifier).cyan()
        );
        if let Some(reason) = &candidate.quarantined {
            println!("  {} quarantined: {reason}", style("!").red().bold());
        }
        println!("{}", style("--- system ---").dim());
        println!("{}", candidate.prompt.system);
        println!("{}", style("--- user ---").dim());
        println!("{}", candidate.prompt.user);
    }
    println!();

    Ok(())
}

fn candidate_list(plan: &GenerationPlan) -> String {
    if plan.candidates.is_empty() {
        return "none".to_string();
    }
    plan.candidates
        .iter()
        .map(|c| c.descriptor.identifier.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_or_dash(labels: &[String]) -> String {
    if labels.is_empty() {
        "-".to_string()
    } else {
        labels.join(", ")
    }
}

fn plan_json(plan: &GenerationPlan, shown: &[&PlannedAttempt]) -> serde_json::Value {
    let candidates: Vec<serde_json::Value> = shown
        .iter()
        .map(|c| {
            json!({
                "backend": c.descriptor.identifier,
                "family": c.descriptor.family,
                "reserved_tokens": c.reserved_tokens,
                "available_tokens": c.allocation.available_tokens,
                "used_tokens": c.allocation.used_tokens,
                "prompt_tokens": c.prompt_tokens,
                "fitted": c.allocation.fitted.iter().map(|b| b.label()).collect::<Vec<_>>(),
                "dropped": c.allocation.dropped_labels,
                "truncated": c.allocation.truncated_labels,
                "quarantined": c.quarantined,
                "prompt": c.prompt,
            })
        })
        .collect();

    json!({
        "tier": plan.assessment.tier,
        "escalated": plan.assessment.escalated,
        "markers": plan.assessment.markers.iter().map(|(_, m)| m).collect::<Vec<_>>(),
        "candidates": candidates,
    })
}
