//! Types for resource reconciliation.

use thiserror::Error;

use edgeship_provider::{PropertyMap, ProviderError, ResourceKind};

use crate::descriptor::ResourceId;
use crate::util::hash::AppliedHash;

/// Observed remote state of one resource.
///
/// Refreshed at the start of every pass and updated as applies land;
/// never persisted locally. The remote provider is the source of truth
/// across process restarts.
#[derive(Debug, Clone)]
pub struct ResourceState {
  pub id: ResourceId,
  pub kind: ResourceKind,
  /// Remote properties including provider-assigned outputs.
  pub remote: PropertyMap,
  pub exists: bool,
  /// Hash of the resolved property set last applied in this pass.
  pub last_applied_hash: Option<AppliedHash>,
}

/// What the reconciler did for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceAction {
  Create,
  /// Update restricted to the named properties.
  Update { changed: Vec<String> },
  /// Remote already matched the resolved desired state.
  Noop,
}

impl ResourceAction {
  pub fn is_mutation(&self) -> bool {
    !matches!(self, ResourceAction::Noop)
  }
}

impl std::fmt::Display for ResourceAction {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ResourceAction::Create => f.write_str("create"),
      ResourceAction::Update { changed } => write!(f, "update ({})", changed.join(", ")),
      ResourceAction::Noop => f.write_str("no-op"),
    }
  }
}

/// One successfully reconciled resource.
#[derive(Debug, Clone)]
pub struct AppliedResource {
  pub id: ResourceId,
  pub action: ResourceAction,
  pub state: ResourceState,
}

/// Per-resource reconciliation failures.
#[derive(Debug, Error)]
pub enum ReconcileError {
  /// The descriptor set's references form a cycle.
  #[error(transparent)]
  Graph(#[from] crate::graph::GraphError),

  /// A referenced resource was not applied earlier in this pass. The
  /// graph ordering makes this impossible for valid descriptor sets, so
  /// hitting it is an invariant violation, not a transient fault.
  #[error("resource '{resource}' references '{reference}.{attribute}' which is not yet applied")]
  UnresolvedReference {
    resource: ResourceId,
    reference: ResourceId,
    attribute: String,
  },

  /// The referenced resource exists but lacks the requested output.
  #[error("resource '{resource}' references unknown attribute '{attribute}' of '{reference}'")]
  UnknownAttribute {
    resource: ResourceId,
    reference: ResourceId,
    attribute: String,
  },

  /// An immutable property differs from the remote value. Detected
  /// before any provider call; requires descriptor or remote correction.
  #[error("property '{property}' of '{resource}' is immutable and cannot be updated")]
  ImmutableProperty {
    resource: ResourceId,
    property: String,
  },

  /// Read-only state fetch failed after exhausting retries.
  #[error("provider unavailable while reading '{resource}': {source}")]
  Provider {
    resource: ResourceId,
    #[source]
    source: ProviderError,
  },

  /// Create or update call failed.
  #[error("failed to apply '{resource}': {source}")]
  Apply {
    resource: ResourceId,
    #[source]
    source: ProviderError,
  },
}

/// Result of one reconciliation pass.
///
/// The pass halts at the first failed resource; everything after it in
/// the apply order lands in `not_attempted`. Reconciliation is
/// idempotent, so retry-from-scratch is always the recovery path.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
  /// Resources brought to (or found in) their desired state, in order.
  pub applied: Vec<AppliedResource>,

  /// The resource that failed, if any. At most one; the pass stops there.
  pub failed: Option<(ResourceId, ReconcileError)>,

  /// Resources after the failure point, never attempted.
  pub not_attempted: Vec<ResourceId>,
}

impl ReconcileOutcome {
  pub fn is_success(&self) -> bool {
    self.failed.is_none() && self.not_attempted.is_empty()
  }

  /// Number of resources that required a mutating call.
  pub fn mutation_count(&self) -> usize {
    self.applied.iter().filter(|a| a.action.is_mutation()).count()
  }

  /// Remote outputs of an applied resource.
  pub fn output(&self, id: &ResourceId, attribute: &str) -> Option<&str> {
    self
      .applied
      .iter()
      .find(|a| &a.id == id)
      .and_then(|a| a.state.remote.get(attribute))
      .map(String::as_str)
  }
}
