//! Plotline CLI entry point.
//!
//! Binary name: `plotline`
//!
//! Parses CLI arguments, initializes tracing, loads configuration and the
//! backend registry, then dispatches to the command handler.

mod cli;
mod console_input;
mod request_file;
mod state;

use std::process::ExitCode;

use clap::Parser;

use cli::{Cli, Commands};
use plotline_observe::tracing_setup::{init_tracing, shutdown_tracing, verbosity_directive};
use state::AppState;

/// Exit code when the request was cancelled before producing a value.
const EXIT_ABORTED: u8 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(verbosity_directive(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let state = AppState::init(cli.data_dir).await?;

    match cli.command {
        Commands::Generate { request, output } => {
            let result =
                cli::generate::generate(&state, &request, output.as_deref(), cli.quiet).await?;
            if result.is_aborted() {
                return Ok(ExitCode::from(EXIT_ABORTED));
            }
        }

        Commands::Inspect { request, backend } => {
            cli::inspect::inspect(&state, &request, backend.as_deref(), cli.json).await?;
        }

        Commands::Backends => {
            cli::backends::list_backends(&state, cli.json)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
