//! Application state shared by every command.
//!
//! Resolves the data directory, loads `config.toml`, and builds the backend
//! registry from the process environment.

use std::path::PathBuf;
use std::sync::Arc;

use plotline_core::llm::registry::BackendRegistry;
use plotline_infra::config::{load_config, resolve_data_dir};
use plotline_infra::llm::{SkippedBackend, build_registry, process_env};
use plotline_types::config::PlotlineConfig;

pub struct AppState {
    pub data_dir: PathBuf,
    pub config: PlotlineConfig,
    pub registry: Arc<BackendRegistry>,
    /// Configured backends that could not be registered.
    pub skipped: Vec<SkippedBackend>,
}

impl AppState {
    /// Load configuration and build the registry.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        let config = load_config(&data_dir).await;
        let (registry, skipped) = build_registry(&config, process_env)?;

        tracing::info!(
            data_dir = %data_dir.display(),
            registered = registry.len(),
            skipped = skipped.len(),
            "Loaded configuration"
        );

        Ok(Self {
            data_dir,
            config,
            registry: Arc::new(registry),
            skipped,
        })
    }
}
