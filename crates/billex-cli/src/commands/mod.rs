pub mod batch;
pub mod config;
pub mod extract;
pub mod output;
pub mod serve;

use std::path::{Path, PathBuf};

use billex_core::BillexConfig;
use tracing::debug;

/// Per-user configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("billex")
        .join("config.json")
}

/// Load configuration from `--config`, else the per-user file, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<BillexConfig> {
    if let Some(path) = config_path {
        return BillexConfig::from_file(Path::new(path))
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path, e));
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Loading config from {}", default_path.display());
        return BillexConfig::from_file(&default_path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", default_path.display(), e));
    }

    Ok(BillexConfig::default())
}
