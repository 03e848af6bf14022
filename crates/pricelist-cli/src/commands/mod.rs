pub mod config;
pub mod extract;
pub mod matching;
pub mod models;

use std::path::Path;

use pricelist_core::PricelistConfig;
use tracing::debug;

/// Explicit `--config` file, else the user config file when present, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<PricelistConfig> {
    if let Some(path) = config_path {
        return PricelistConfig::from_file(Path::new(path))
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path, e));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        debug!("Loading config from {}", default_path.display());
        Ok(PricelistConfig::from_file(&default_path)?)
    } else {
        Ok(PricelistConfig::default())
    }
}
