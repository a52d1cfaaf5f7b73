//! Implementation of the `edgeship apply` command.
//!
//! Reconciles infrastructure resources only. Content sync and cache
//! invalidation are left to `edgeship deploy`; apply is useful when the
//! topology changed but the assets did not.

use std::path::Path;

use anyhow::{Context, Result};

use edgeship_lib::descriptor::{DescriptorSet, topology};
use edgeship_lib::reconcile::reconcile;

use crate::output::{print_error, print_info, print_stat, print_success};

pub fn cmd_apply(config_path: &Path) -> Result<()> {
  let (config, provider) = super::load(config_path)?;

  let set = DescriptorSet::new(topology::site_descriptors(&config.site))
    .context("Invalid site topology")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt
    .block_on(reconcile(&set, &*provider, &config.retry))
    .context("Failed to order resources")?;

  print_info(&format!("Site: {}", config.site.name));
  for applied in &outcome.applied {
    print_stat(applied.id.as_str(), &applied.action.to_string());
  }

  if let Some((id, cause)) = &outcome.failed {
    print_error(&format!("Failed on {}: {}", id, cause));
    for id in &outcome.not_attempted {
      print_stat(id.as_str(), "not attempted");
    }
    anyhow::bail!("reconciliation failed");
  }

  print_success(&format!(
    "{} resource(s) reconciled, {} change(s)",
    outcome.applied.len(),
    outcome.mutation_count()
  ));

  Ok(())
}
