//! Content manifests.
//!
//! A manifest maps relative object paths (`/`-separated, no leading
//! slash) to content fingerprints. The local manifest is computed by
//! walking the asset tree; the remote manifest by listing the origin
//! store. Both are recomputed on every run.

use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

use edgeship_provider::{ObjectMeta, ObjectStore};

use crate::retry::{RetryPolicy, with_backoff};
use crate::util::hash::{Fingerprint, hash_file};

use super::SyncError;

/// Mapping from relative object path to content fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentManifest {
  entries: BTreeMap<String, Fingerprint>,
}

impl ContentManifest {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, path: impl Into<String>, fingerprint: impl Into<Fingerprint>) {
    self.entries.insert(path.into(), fingerprint.into());
  }

  pub fn get(&self, path: &str) -> Option<&Fingerprint> {
    self.entries.get(path)
  }

  pub fn contains(&self, path: &str) -> bool {
    self.entries.contains_key(path)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Fingerprint)> {
    self.entries.iter()
  }

  pub fn paths(&self) -> impl Iterator<Item = &String> {
    self.entries.keys()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Build a manifest from a store listing.
  pub fn from_listing(listing: Vec<ObjectMeta>) -> Self {
    let mut manifest = Self::new();
    for object in listing {
      manifest.entries.insert(object.path, object.fingerprint);
    }
    manifest
  }
}

/// Walk the local asset tree and fingerprint every file.
///
/// Paths are normalized to `/` separators relative to `root`.
pub fn local_manifest(root: &Path) -> Result<ContentManifest, SyncError> {
  if !root.is_dir() {
    return Err(SyncError::AssetRootMissing(root.to_path_buf()));
  }

  let mut manifest = ContentManifest::new();
  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry.map_err(|e| SyncError::Walk(e.to_string()))?;
    if !entry.file_type().is_file() {
      continue;
    }
    let rel = entry
      .path()
      .strip_prefix(root)
      .expect("walked path is under the root");
    let path = rel
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    let fingerprint = hash_file(entry.path()).map_err(|source| SyncError::Io {
      path: entry.path().to_path_buf(),
      source,
    })?;
    manifest.entries.insert(path, fingerprint);
  }

  Ok(manifest)
}

/// List the origin store and build the remote manifest.
///
/// Listing is read-only, so transient provider errors are retried.
pub async fn remote_manifest<S: ObjectStore>(
  store: &S,
  store_name: &str,
  retry: &RetryPolicy,
) -> Result<ContentManifest, SyncError> {
  let listing = with_backoff(retry, "list", || store.list(store_name, ""))
    .await
    .map_err(|source| SyncError::List {
      store: store_name.to_string(),
      source,
    })?;
  Ok(ContentManifest::from_listing(listing))
}
