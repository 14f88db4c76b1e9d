//! Configuration loader for Plotline.
//!
//! Reads `config.toml` from the data directory (`~/.plotline/` in production)
//! and deserializes it into [`PlotlineConfig`]. Falls back to defaults when
//! the file is missing, malformed, or fails validation.

use std::path::{Path, PathBuf};

use plotline_types::config::PlotlineConfig;

/// File name of the configuration inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Resolve the data directory.
///
/// `PLOTLINE_DATA_DIR` wins, then `~/.plotline`, then `.plotline` in the
/// current directory.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PLOTLINE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".plotline");
    }

    PathBuf::from(".plotline")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`PlotlineConfig::default()`].
/// - If the file cannot be read or parsed, logs a warning and returns the default.
/// - If the parsed config fails [`PlotlineConfig::validate`], logs a warning
///   and returns the default.
pub async fn load_config(data_dir: &Path) -> PlotlineConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return PlotlineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return PlotlineConfig::default();
        }
    };

    let config = match toml::from_str::<PlotlineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            return PlotlineConfig::default();
        }
    };

    match config.validate() {
        Ok(()) => config,
        Err(err) => {
            tracing::warn!("Invalid {}: {err}, using defaults", config_path.display());
            PlotlineConfig::default()
        }
    }
}
