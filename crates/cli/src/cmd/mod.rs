mod apply;
mod deploy;
mod plan;
mod status;

pub use apply::cmd_apply;
pub use deploy::cmd_deploy;
pub use plan::cmd_plan;
pub use status::cmd_status;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use edgeship_lib::config::DeployConfig;
use edgeship_provider::FsProvider;

/// Load the config and open the filesystem provider rooted next to it.
pub(crate) fn load(config_path: &Path) -> Result<(DeployConfig, Arc<FsProvider>)> {
  let config = DeployConfig::load(config_path)
    .with_context(|| format!("Failed to load config: {}", config_path.display()))?;
  let provider = FsProvider::open(config.provider_root())
    .with_context(|| format!("Failed to open provider state: {}", config.provider_root().display()))?;
  Ok((config, Arc::new(provider)))
}
