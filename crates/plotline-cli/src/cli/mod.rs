//! CLI command definitions for the `plotline` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod backends;
pub mod generate;
pub mod inspect;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Resilient structured generation over multiple LLM backends.
#[derive(Parser)]
#[command(name = "plotline", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory holding config.toml.
    #[arg(long, global = true, env = "PLOTLINE_DATA_DIR", value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a request through the backends, falling back to manual input.
    Generate {
        /// Request file (JSON).
        #[arg(long, short)]
        request: PathBuf,

        /// Write the result here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show classification, candidates, and rendered prompts without calling anything.
    Inspect {
        /// Request file (JSON).
        #[arg(long, short)]
        request: PathBuf,

        /// Only show this candidate.
        #[arg(long, short)]
        backend: Option<String>,
    },

    /// List configured backends and whether they are usable.
    Backends,
}
