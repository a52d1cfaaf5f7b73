//! Resource reconciliation.
//!
//! Brings remote resources to match the declared descriptor set, one
//! resource at a time in topological order:
//!
//! 1. Read remote state (read-only; retried with bounded backoff)
//! 2. Resolve referenced outputs from resources applied earlier this pass
//! 3. Diff resolved desired properties against remote properties
//! 4. Create the resource, update changed properties only, or no-op
//!
//! The pass halts at the first failure; later resources may depend on the
//! failed one, so they are reported as not attempted. Re-running against
//! an already-converged target issues zero mutating calls.

pub mod resolver;
pub mod types;

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use edgeship_provider::{PropertyMap, RemoteResource, ResourceProvider};

use crate::descriptor::{DescriptorSet, ResourceDescriptor, ResourceId};
use crate::graph::{DependencyGraph, GraphError};
use crate::retry::{RetryPolicy, with_backoff};
use crate::util::hash::Hashable;

use resolver::ReferenceResolver;

pub use types::{
  AppliedResource, ReconcileError, ReconcileOutcome, ResourceAction, ResourceState,
};

/// Reconcile a descriptor set against the provider.
///
/// Cycle detection runs before any provider call; a cyclic set fails
/// here with no mutations. Per-resource failures land in the returned
/// [`ReconcileOutcome`] together with the partial-progress detail.
pub async fn reconcile<P: ResourceProvider>(
  set: &DescriptorSet,
  provider: &P,
  retry: &RetryPolicy,
) -> Result<ReconcileOutcome, GraphError> {
  let graph = DependencyGraph::build(set)?;
  let order = graph.apply_order();

  info!(resources = order.len(), "starting reconciliation");

  let mut outcome = ReconcileOutcome::default();
  let mut outputs: BTreeMap<ResourceId, PropertyMap> = BTreeMap::new();

  let mut remaining = order.into_iter();
  while let Some(id) = remaining.next() {
    let descriptor = set.get(&id).expect("apply order comes from the set");

    match apply_one(descriptor, provider, retry, &outputs).await {
      Ok(applied) => {
        info!(resource = %id, action = %applied.action, "resource reconciled");
        outputs.insert(id, applied.state.remote.clone());
        outcome.applied.push(applied);
      }
      Err(e) => {
        error!(resource = %id, error = %e, "reconciliation failed, halting pass");
        outcome.failed = Some((id, e));
        outcome.not_attempted = remaining.collect();
        break;
      }
    }
  }

  info!(
    applied = outcome.applied.len(),
    mutations = outcome.mutation_count(),
    failed = outcome.failed.is_some(),
    not_attempted = outcome.not_attempted.len(),
    "reconciliation complete"
  );

  Ok(outcome)
}

/// Reconcile a single resource.
async fn apply_one<P: ResourceProvider>(
  descriptor: &ResourceDescriptor,
  provider: &P,
  retry: &RetryPolicy,
  outputs: &BTreeMap<ResourceId, PropertyMap>,
) -> Result<AppliedResource, ReconcileError> {
  let id = &descriptor.id;
  let kind = descriptor.kind;

  // 1. Observe. Read-only, safe to repeat.
  let current = with_backoff(retry, "read_resource", || {
    provider.read_resource(kind, id.as_str())
  })
  .await
  .map_err(|source| ReconcileError::Provider {
    resource: id.clone(),
    source,
  })?;

  // 2. Resolve references against outputs applied earlier this pass.
  let resolved = ReferenceResolver::new(outputs).resolve(descriptor)?;

  // 3 & 4. Diff and apply.
  let (action, remote) = match current {
    None => {
      let remote = provider
        .create_resource(kind, id.as_str(), &resolved)
        .await
        .map_err(|source| ReconcileError::Apply {
          resource: id.clone(),
          source,
        })?;
      (ResourceAction::Create, remote)
    }
    Some(remote) => {
      let changed = diff_properties(&resolved, &remote.properties);
      if changed.is_empty() {
        (ResourceAction::Noop, remote)
      } else {
        // Immutable violations are checked before any provider call.
        for property in kind.immutable_properties() {
          if changed.iter().any(|c| c == property) {
            return Err(ReconcileError::ImmutableProperty {
              resource: id.clone(),
              property: (*property).to_string(),
            });
          }
        }
        let delta: PropertyMap = changed
          .iter()
          .map(|key| (key.clone(), resolved[key].clone()))
          .collect();
        warn!(resource = %id, changed = ?changed, "remote state drifted, updating");
        let remote = provider
          .update_resource(kind, id.as_str(), &delta)
          .await
          .map_err(|source| ReconcileError::Apply {
            resource: id.clone(),
            source,
          })?;
        (ResourceAction::Update { changed }, remote)
      }
    }
  };

  Ok(AppliedResource {
    id: id.clone(),
    action,
    state: ResourceState {
      id: id.clone(),
      kind,
      remote: remote.properties,
      exists: true,
      last_applied_hash: resolved.compute_hash().ok(),
    },
  })
}

/// Keys whose resolved desired value differs from (or is absent in) the
/// remote properties. Remote-only keys are provider outputs and never
/// count as drift.
fn diff_properties(resolved: &PropertyMap, remote: &PropertyMap) -> Vec<String> {
  resolved
    .iter()
    .filter(|(key, value)| remote.get(*key) != Some(*value))
    .map(|(key, _)| key.clone())
    .collect()
}

/// A read-only preview of what reconciliation would do.
#[derive(Debug, Clone)]
pub struct PlannedChange {
  pub id: ResourceId,
  pub action: ResourceAction,
}

/// Compute a reconciliation preview without mutating anything.
///
/// References whose target does not exist remotely yet cannot be
/// resolved ahead of time; the affected properties are conservatively
/// reported as changed.
pub async fn preview<P: ResourceProvider>(
  set: &DescriptorSet,
  provider: &P,
  retry: &RetryPolicy,
) -> Result<Vec<PlannedChange>, ReconcileError> {
  let graph = DependencyGraph::build(set)?;
  let order = graph.apply_order();

  let mut outputs: BTreeMap<ResourceId, PropertyMap> = BTreeMap::new();
  let mut changes = Vec::with_capacity(order.len());

  for id in order {
    let descriptor = set.get(&id).expect("apply order comes from the set");
    let current = with_backoff(retry, "read_resource", || {
      provider.read_resource(descriptor.kind, id.as_str())
    })
    .await
    .map_err(|source| ReconcileError::Provider {
      resource: id.clone(),
      source,
    })?;

    let action = match current {
      None => ResourceAction::Create,
      Some(RemoteResource { properties }) => {
        let resolver = ReferenceResolver::new(&outputs);
        let mut changed = Vec::new();
        for (name, _) in &descriptor.properties {
          let single = descriptor_property(descriptor, name);
          match resolver.resolve(&single) {
            Ok(resolved) => {
              if properties.get(name) != resolved.get(name) {
                changed.push(name.clone());
              }
            }
            // Reference target absent remotely: not knowable yet.
            Err(_) => changed.push(name.clone()),
          }
        }
        outputs.insert(id.clone(), properties);
        if changed.is_empty() {
          ResourceAction::Noop
        } else {
          ResourceAction::Update { changed }
        }
      }
    };
    changes.push(PlannedChange { id, action });
  }

  Ok(changes)
}

/// A one-property descriptor used to resolve properties individually in
/// previews, so one unresolvable reference does not hide other diffs.
fn descriptor_property(descriptor: &ResourceDescriptor, name: &str) -> ResourceDescriptor {
  let mut single = ResourceDescriptor::new(descriptor.id.clone(), descriptor.kind);
  if let Some(value) = descriptor.properties.get(name) {
    single = single.with(name.to_string(), value.clone());
  }
  single
}
