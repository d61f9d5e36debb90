//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_simulation;
pub use validate::run_validate;

use std::path::Path;

use contracts::BackpressureConfig;
use tracing::info;

use crate::error::{CliError, Result};

/// Load a configuration file, or the defaults when no path is given
pub(crate) fn load_config(path: Option<&Path>) -> Result<BackpressureConfig> {
    let Some(path) = path else {
        info!("No configuration file given, using defaults");
        return Ok(BackpressureConfig::default());
    };

    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }

    info!(config = %path.display(), "Loading configuration");
    config_loader::ConfigLoader::load_from_path(path)
        .map_err(|e| CliError::config_load(path.display().to_string(), e))
}
