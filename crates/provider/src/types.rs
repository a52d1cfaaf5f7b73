//! Vocabulary types shared across the provider boundary.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kinds of infrastructure resources edgeship manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
  /// The origin object store backing the site's content.
  ObjectStore,
  /// A policy document attached to the store.
  AccessPolicy,
  /// The CDN distribution fronting the store.
  CdnDistribution,
  /// The origin-access-control object referenced by the distribution.
  OriginAccessControl,
}

impl ResourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResourceKind::ObjectStore => "object_store",
      ResourceKind::AccessPolicy => "access_policy",
      ResourceKind::CdnDistribution => "cdn_distribution",
      ResourceKind::OriginAccessControl => "origin_access_control",
    }
  }

  /// Properties that cannot change after the resource is created.
  ///
  /// Attempting to diff one of these into an update is rejected before
  /// any provider call is made.
  pub fn immutable_properties(&self) -> &'static [&'static str] {
    match self {
      ResourceKind::ObjectStore => &["name", "region"],
      ResourceKind::OriginAccessControl => &["name"],
      ResourceKind::AccessPolicy | ResourceKind::CdnDistribution => &[],
    }
  }
}

impl std::fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ResourceKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "object_store" => Ok(ResourceKind::ObjectStore),
      "access_policy" => Ok(ResourceKind::AccessPolicy),
      "cdn_distribution" => Ok(ResourceKind::CdnDistribution),
      "origin_access_control" => Ok(ResourceKind::OriginAccessControl),
      other => Err(format!("unsupported resource kind: {other}")),
    }
  }
}

/// Resolved resource properties as the provider sees them.
///
/// Keys are property names, values are plain strings (names, identifiers,
/// serialized policy documents). Ordering is stable for deterministic
/// diffs and hashing.
pub type PropertyMap = BTreeMap<String, String>;

/// The remote side of a resource, as returned by the provider.
///
/// `properties` contains both the applied desired properties and any
/// provider-assigned outputs (identifier, hostname, ARN-equivalent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResource {
  pub properties: PropertyMap,
}

impl RemoteResource {
  pub fn new(properties: PropertyMap) -> Self {
    Self { properties }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.properties.get(key).map(String::as_str)
  }
}

/// Metadata for one stored object, as returned by `ObjectStore::list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
  /// Path relative to the store root, `/`-separated, no leading slash.
  pub path: String,
  /// Content fingerprint (full SHA-256 hex).
  pub fingerprint: String,
  /// Object size in bytes.
  pub size: u64,
}

/// Status of an edge invalidation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationStatus {
  Pending,
  Completed,
  Failed,
}
