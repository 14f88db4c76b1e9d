//! `plotline backends`: what is configured and what is usable.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde::Serialize;

use plotline_infra::config::CONFIG_FILE;
use plotline_infra::llm::{has_credential, process_env};
use plotline_types::config::BackendConfig;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct BackendRow<'a> {
    identifier: &'a str,
    kind: String,
    model: &'a str,
    family: String,
    capacity_tokens: u32,
    max_permitted_tier: String,
    quality: u32,
    cost_rank: u32,
    credential_env: &'a str,
    credential_present: bool,
    registered: bool,
}

fn row<'a>(state: &AppState, backend: &'a BackendConfig) -> BackendRow<'a> {
    BackendRow {
        identifier: &backend.identifier,
        kind: backend.kind.to_string(),
        model: &backend.model,
        family: backend.family().to_string(),
        capacity_tokens: backend.capacity_tokens,
        max_permitted_tier: backend.max_permitted_tier.to_string(),
        quality: backend.quality,
        cost_rank: backend.cost_rank,
        credential_env: &backend.credential_env,
        credential_present: has_credential(backend, &process_env),
        registered: state.registry.get(&backend.identifier).is_some(),
    }
}

pub fn list_backends(state: &AppState, json: bool) -> Result<()> {
    let rows: Vec<BackendRow<'_>> = state.config.backends.iter().map(|b| row(state, b)).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("Backends from").bold(),
        style(state.data_dir.join(CONFIG_FILE).display()).dim()
    );
    println!();

    if rows.is_empty() {
        println!(
            "  {} No backends configured. Every request will ask for manual input.",
            style("i").blue().bold()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Backend").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Model").fg(Color::White),
        Cell::new("Family").fg(Color::White),
        Cell::new("Capacity").fg(Color::White),
        Cell::new("Max Tier").fg(Color::White),
        Cell::new("Quality").fg(Color::White),
        Cell::new("Cost").fg(Color::White),
        Cell::new("Credential").fg(Color::White),
    ]);

    for r in &rows {
        let credential = if r.registered {
            Cell::new("✓").fg(Color::Green)
        } else if r.credential_present {
            Cell::new("error").fg(Color::Yellow)
        } else {
            Cell::new(format!("✗ {}", r.credential_env)).fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(r.identifier).fg(Color::Cyan),
            Cell::new(&r.kind).fg(Color::DarkGrey),
            Cell::new(r.model).fg(Color::DarkGrey),
            Cell::new(&r.family).fg(Color::White),
            Cell::new(r.capacity_tokens).fg(Color::White),
            Cell::new(&r.max_permitted_tier).fg(Color::White),
            Cell::new(r.quality).fg(Color::White),
            Cell::new(r.cost_rank).fg(Color::White),
            credential,
        ]);
    }

    println!("{table}");
    println!();
    println!(
        "  {} of {} backend{} usable",
        style(state.registry.len()).bold(),
        rows.len(),
        if rows.len() == 1 { "" } else { "s" }
    );
    for skipped in &state.skipped {
        println!("  {} {}: {}", style("-").dim(), skipped.identifier, style(&skipped.reason).dim());
    }
    println!();

    Ok(())
}
