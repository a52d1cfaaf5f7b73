//! Implementation of the `edgeship plan` command.
//!
//! Read-only: previews the resource changes reconciliation would make
//! and diffs the local asset tree against the origin store. Nothing is
//! created, uploaded or invalidated.

use std::path::Path;

use anyhow::{Context, Result};

use edgeship_lib::descriptor::{DescriptorSet, topology};
use edgeship_lib::reconcile::{ResourceAction, preview};
use edgeship_lib::sync::{ContentManifest, PublishPlan, local_manifest, remote_manifest};
use edgeship_provider::ProviderError;

use crate::output::{self, print_info, print_stat};

pub fn cmd_plan(config_path: &Path) -> Result<()> {
  let (config, provider) = super::load(config_path)?;

  let set = DescriptorSet::new(topology::site_descriptors(&config.site))
    .context("Invalid site topology")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let changes = rt
    .block_on(preview(&set, &*provider, &config.retry))
    .context("Failed to compute resource plan")?;

  print_info(&format!("Site: {}", config.site.name));
  println!();
  println!("Resources:");
  let mut mutations = 0;
  for change in &changes {
    let symbol = match &change.action {
      ResourceAction::Create => output::symbols::ADD,
      ResourceAction::Update { .. } => output::symbols::MODIFY,
      ResourceAction::Noop => output::symbols::UNCHANGED,
    };
    if change.action.is_mutation() {
      mutations += 1;
    }
    println!("  {} {} ({})", symbol, change.id, change.action);
  }

  let local = local_manifest(&config.site.asset_root)
    .with_context(|| format!("Failed to scan {}", config.site.asset_root.display()))?;
  // A store that has not been created yet simply has no content.
  let remote = match rt.block_on(remote_manifest(
    &*provider,
    topology::store_id(&config.site).as_str(),
    &config.retry,
  )) {
    Ok(remote) => remote,
    Err(edgeship_lib::SyncError::List {
      source: ProviderError::StoreNotFound(_),
      ..
    }) => ContentManifest::new(),
    Err(e) => return Err(e).context("Failed to list origin store"),
  };
  let plan = PublishPlan::compute(&local, &remote);

  println!();
  println!("Content:");
  for path in &plan.to_upload {
    println!("  {} {}", output::symbols::ADD, path);
  }
  for path in &plan.to_delete {
    println!("  {} {}", output::symbols::REMOVE, path);
  }
  if plan.is_empty() {
    println!("  (up to date)");
  }

  println!();
  print_stat("Resource changes", &mutations.to_string());
  print_stat("Uploads", &plan.to_upload.len().to_string());
  print_stat("Deletes", &plan.to_delete.len().to_string());
  print_stat("Paths to invalidate", &plan.invalidation_paths().len().to_string());

  Ok(())
}
