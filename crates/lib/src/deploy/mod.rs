//! Deployment coordinator.
//!
//! Sequences the three stages over one provider:
//!
//! ```text
//! reconcile -> sync -> invalidate
//! ```
//!
//! Each stage only starts if the previous one fully succeeded, and
//! invalidation is only ever fed paths whose origin content actually
//! changed. That ordering is what makes the pipeline safe to interrupt:
//! stopping between stages leaves the edge serving the previous version,
//! never a missing or half-published one.
//!
//! Cancellation is cooperative. The token is checked at stage boundaries
//! and between transfers; whatever completed stays completed, and the
//! report says where the run stopped.

mod report;

pub use report::{DeployStage, ResourceSummary, RunReport, RunStatus};

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};

use edgeship_provider::{EdgeCache, ObjectStore, ResourceProvider};

use crate::cancel::CancelToken;
use crate::config::{ConfigError, DeployConfig};
use crate::descriptor::{DescriptorSet, topology};
use crate::graph::GraphError;
use crate::invalidate::{InvalidateError, InvalidateOptions, invalidate};
use crate::reconcile::reconcile;
use crate::sync::{PublishPlan, SyncOptions, execute_plan, local_manifest, remote_manifest};

/// Errors that prevent a run from starting at all. Once the pipeline is
/// running, failures land in the report instead.
#[derive(Debug, Error)]
pub enum DeployError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// Run the full deployment pipeline for a site.
///
/// Returns the run report; `Err` is reserved for configuration and
/// descriptor validation problems found before any remote call.
pub async fn deploy<P>(
  config: &DeployConfig,
  provider: Arc<P>,
  cancel: CancelToken,
) -> Result<RunReport, DeployError>
where
  P: ResourceProvider + ObjectStore + EdgeCache + 'static,
{
  let site = &config.site;
  let mut report = RunReport::new(&site.name, Utc::now());
  info!(site = site.name, "starting deployment");

  // --- stage 1: reconcile ---

  if cancel.is_cancelled() {
    return Ok(report.finish(RunStatus::Cancelled { stage: DeployStage::Reconcile }));
  }

  let set = DescriptorSet::new(topology::site_descriptors(site))?;
  let outcome = reconcile(&set, &*provider, &config.retry).await?;

  report.resources = outcome
    .applied
    .iter()
    .map(|a| ResourceSummary {
      id: a.id.clone(),
      action: a.action.to_string(),
    })
    .collect();
  let dist = topology::distribution_id(site);
  report.distribution_id = outcome.output(&dist, "distribution_id").map(String::from);
  report.hostname = outcome.output(&dist, "domain_name").map(String::from);

  if let Some((id, cause)) = &outcome.failed {
    error!(site = site.name, resource = %id, error = %cause, "reconcile stage failed");
    return Ok(report.finish(RunStatus::Failed {
      stage: DeployStage::Reconcile,
      cause: format!("{id}: {cause}"),
    }));
  }

  // --- stage 2: sync ---

  if cancel.is_cancelled() {
    return Ok(report.finish(RunStatus::Cancelled { stage: DeployStage::Sync }));
  }

  let store_name = topology::store_id(site);
  report.store = Some(store_name.as_str().to_string());
  let options = SyncOptions {
    concurrency: config.transfer.concurrency,
    retry: config.retry.clone(),
    cancel: cancel.clone(),
  };

  let sync = async {
    let local = local_manifest(&site.asset_root)?;
    let remote = remote_manifest(&*provider, store_name.as_str(), &config.retry).await?;
    let plan = PublishPlan::compute(&local, &remote);
    execute_plan(
      provider.clone(),
      store_name.as_str(),
      &site.asset_root,
      &plan,
      &options,
    )
    .await
  };
  let synced = match sync.await {
    Ok(synced) => synced,
    Err(e) => {
      error!(site = site.name, error = %e, "sync stage failed");
      return Ok(report.finish(RunStatus::Failed {
        stage: DeployStage::Sync,
        cause: e.to_string(),
      }));
    }
  };

  report.uploaded = synced.uploaded.clone();
  report.deleted = synced.deleted.clone();
  report.failed_paths = synced
    .failed
    .iter()
    .map(|f| f.path.clone())
    .chain(synced.skipped.iter().cloned())
    .collect();

  let changed = synced.changed_paths();
  if !synced.is_success() {
    // Whatever landed at the origin is now stale at the edge.
    report.stale_paths = changed.into_iter().collect();
    let status = if synced.cancelled {
      RunStatus::Cancelled { stage: DeployStage::Sync }
    } else {
      RunStatus::Failed {
        stage: DeployStage::Sync,
        cause: format!("{} transfer(s) failed", synced.failed.len()),
      }
    };
    return Ok(report.finish(status));
  }

  // --- stage 3: invalidate ---

  if cancel.is_cancelled() {
    report.stale_paths = changed.into_iter().collect();
    return Ok(report.finish(RunStatus::Cancelled { stage: DeployStage::Invalidate }));
  }

  let Some(distribution) = report.distribution_id.clone() else {
    // The fixed topology always yields a distribution; a provider that
    // does not report one cannot be invalidated against.
    report.stale_paths = changed.into_iter().collect();
    return Ok(report.finish(RunStatus::Failed {
      stage: DeployStage::Invalidate,
      cause: "provider reported no distribution identifier".to_string(),
    }));
  };

  let inv_options = InvalidateOptions {
    max_batch: config.invalidation.max_batch,
    retry: config.retry.clone(),
    poll_attempts: config.invalidation.poll_attempts,
    poll_delay: config.invalidation.poll_delay,
    cancel: cancel.clone(),
  };
  match invalidate(&*provider, &distribution, &changed, &inv_options).await {
    Ok(invalidated) => {
      report.invalidation_ids = invalidated.invalidation_ids;
      report.invalidated_paths = invalidated.paths;
      info!(
        site = site.name,
        resources = report.resources.len(),
        uploaded = report.uploaded.len(),
        deleted = report.deleted.len(),
        invalidated = report.invalidated_paths.len(),
        "deployment complete"
      );
      Ok(report.finish(RunStatus::Complete))
    }
    Err(e) => {
      error!(site = site.name, error = %e, "invalidate stage failed");
      // The origin is already committed, so every path the run did not
      // manage to invalidate is being served stale until a later run
      // invalidates it.
      report.invalidated_paths = e.submitted().to_vec();
      report.stale_paths = e.failed().to_vec();
      let status = match e {
        InvalidateError::Cancelled { .. } => {
          RunStatus::Cancelled { stage: DeployStage::Invalidate }
        }
        e => RunStatus::Failed {
          stage: DeployStage::Invalidate,
          cause: e.to_string(),
        },
      };
      Ok(report.finish(status))
    }
  }
}
