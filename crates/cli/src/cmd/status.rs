//! Implementation of the `edgeship status` command.
//!
//! Read-only: shows the remote state of the site's resources and how
//! many objects the origin store currently holds.

use std::path::Path;

use anyhow::{Context, Result};

use edgeship_lib::descriptor::topology;
use edgeship_provider::{ObjectStore, ProviderError, ResourceProvider};

use crate::output::{print_info, print_stat};

pub fn cmd_status(config_path: &Path) -> Result<()> {
  let (config, provider) = super::load(config_path)?;
  let site = &config.site;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async {
    print_info(&format!("Site: {}", site.name));

    let descriptors = topology::site_descriptors(site);
    for descriptor in &descriptors {
      let remote = provider
        .read_resource(descriptor.kind, descriptor.id.as_str())
        .await
        .with_context(|| format!("Failed to read {}", descriptor.id))?;
      match remote {
        Some(_) => print_stat(descriptor.id.as_str(), "present"),
        None => print_stat(descriptor.id.as_str(), "missing"),
      }
    }

    let dist = topology::distribution_id(site);
    if let Some(remote) = provider
      .read_resource(edgeship_provider::ResourceKind::CdnDistribution, dist.as_str())
      .await
      .context("Failed to read distribution")?
    {
      if let Some(hostname) = remote.get("domain_name") {
        print_stat("Hostname", hostname);
      }
    }

    match provider.list(topology::store_id(site).as_str(), "").await {
      Ok(objects) => print_stat("Objects", &objects.len().to_string()),
      Err(ProviderError::StoreNotFound(_)) => print_stat("Objects", "store not created"),
      Err(e) => return Err(e).context("Failed to list origin store"),
    }

    Ok(())
  })
}
