//! Provider traits.
//!
//! The concrete cloud APIs are out of scope; these traits are the
//! documented boundary the reconciler, synchronizer and invalidator talk
//! to. Methods return `impl Future + Send` so callers can drive them
//! from spawned tasks.

use std::future::Future;

use crate::error::ProviderError;
use crate::types::{
  InvalidationStatus, ObjectMeta, PropertyMap, RemoteResource, ResourceKind,
};

/// Control plane: generic keyed resources (store, policy, distribution,
/// origin access control).
///
/// Resources are addressed by `(kind, name)` where `name` is the
/// descriptor id. `create_resource` receives the full resolved property
/// map; `update_resource` receives only the changed properties. Both
/// return the resulting remote state including provider-assigned outputs
/// (identifier, hostname, ARN-equivalent).
pub trait ResourceProvider: Send + Sync {
  /// Read the current remote state of a resource. `None` means the
  /// resource does not exist. Read-only.
  fn read_resource(
    &self,
    kind: ResourceKind,
    name: &str,
  ) -> impl Future<Output = Result<Option<RemoteResource>, ProviderError>> + Send;

  /// Create the resource with the given properties.
  fn create_resource(
    &self,
    kind: ResourceKind,
    name: &str,
    properties: &PropertyMap,
  ) -> impl Future<Output = Result<RemoteResource, ProviderError>> + Send;

  /// Apply only the changed properties to an existing resource.
  fn update_resource(
    &self,
    kind: ResourceKind,
    name: &str,
    changed: &PropertyMap,
  ) -> impl Future<Output = Result<RemoteResource, ProviderError>> + Send;
}

/// Content plane: the origin object store.
pub trait ObjectStore: Send + Sync {
  /// List objects under `prefix` with their stored (or recomputed)
  /// content fingerprints.
  fn list(
    &self,
    store: &str,
    prefix: &str,
  ) -> impl Future<Output = Result<Vec<ObjectMeta>, ProviderError>> + Send;

  /// Durably store an object. Overwrites any existing object at `path`.
  fn put(
    &self,
    store: &str,
    path: &str,
    bytes: Vec<u8>,
    fingerprint: &str,
  ) -> impl Future<Output = Result<(), ProviderError>> + Send;

  /// Remove an object. Deleting an absent path is not an error.
  fn delete(
    &self,
    store: &str,
    path: &str,
  ) -> impl Future<Output = Result<(), ProviderError>> + Send;
}

/// Edge plane: cache invalidation against a distribution.
pub trait EdgeCache: Send + Sync {
  /// Submit an invalidation for the given paths (leading `/`), returning
  /// the provider's invalidation identifier. Re-invalidating an
  /// already-invalidated path is a no-op at the edge.
  fn create_invalidation(
    &self,
    distribution: &str,
    paths: &[String],
  ) -> impl Future<Output = Result<String, ProviderError>> + Send;

  /// Poll the status of a previously created invalidation.
  fn invalidation_status(
    &self,
    distribution: &str,
    invalidation: &str,
  ) -> impl Future<Output = Result<InvalidationStatus, ProviderError>> + Send;
}
