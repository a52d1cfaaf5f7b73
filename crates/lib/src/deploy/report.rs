//! The deployment run report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::descriptor::ResourceId;

/// The pipeline stage a failure or cancellation happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStage {
  Reconcile,
  Sync,
  Invalidate,
}

impl std::fmt::Display for DeployStage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DeployStage::Reconcile => write!(f, "reconcile"),
      DeployStage::Sync => write!(f, "sync"),
      DeployStage::Invalidate => write!(f, "invalidate"),
    }
  }
}

/// Terminal status of a deployment run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
  /// All three stages finished.
  Complete,
  /// The named stage failed; later stages were not entered.
  Failed { stage: DeployStage, cause: String },
  /// Cancellation was observed in the named stage.
  Cancelled { stage: DeployStage },
}

impl RunStatus {
  pub fn is_complete(&self) -> bool {
    matches!(self, RunStatus::Complete)
  }
}

/// One reconciled resource, as reported.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSummary {
  pub id: ResourceId,
  /// "create", "update (prop, ..)" or "no-op".
  pub action: String,
}

/// Everything a deployment run did, stage by stage.
///
/// The report is cumulative: a run that fails in the sync stage still
/// carries the reconcile results, so the operator can see exactly how far
/// the pipeline got and what remote state it left behind.
#[derive(Debug, Serialize)]
pub struct RunReport {
  pub site: String,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub status: RunStatus,

  /// Reconciled resources in apply order.
  pub resources: Vec<ResourceSummary>,
  /// Origin store targeted by the content sync.
  pub store: Option<String>,
  /// Provider-assigned distribution identifier, once known.
  pub distribution_id: Option<String>,
  /// Public hostname of the distribution, once known.
  pub hostname: Option<String>,

  pub uploaded: Vec<String>,
  pub deleted: Vec<String>,
  /// Transfers that failed or were never issued.
  pub failed_paths: Vec<String>,

  pub invalidation_ids: Vec<String>,
  pub invalidated_paths: Vec<String>,
  /// Paths whose origin content changed this run but whose edge cache
  /// entries were not invalidated. Non-empty exactly when the pipeline
  /// stopped between origin commit and edge invalidation.
  pub stale_paths: Vec<String>,
}

impl RunReport {
  pub(super) fn new(site: &str, started_at: DateTime<Utc>) -> Self {
    Self {
      site: site.to_string(),
      started_at,
      finished_at: started_at,
      status: RunStatus::Complete,
      resources: Vec::new(),
      store: None,
      distribution_id: None,
      hostname: None,
      uploaded: Vec::new(),
      deleted: Vec::new(),
      failed_paths: Vec::new(),
      invalidation_ids: Vec::new(),
      invalidated_paths: Vec::new(),
      stale_paths: Vec::new(),
    }
  }

  pub(super) fn finish(mut self, status: RunStatus) -> Self {
    self.status = status;
    self.finished_at = Utc::now();
    self
  }
}
