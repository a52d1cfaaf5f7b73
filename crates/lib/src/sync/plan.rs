//! Publish plan computation.

use std::collections::BTreeSet;

use super::manifest::ContentManifest;

/// The set of transfers needed to make the origin match the local tree.
///
/// An object is uploaded when it is absent remotely or its fingerprint
/// differs; it is deleted when it exists remotely but not locally.
/// Matching fingerprints produce no transfer at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishPlan {
  pub to_upload: BTreeSet<String>,
  pub to_delete: BTreeSet<String>,
}

impl PublishPlan {
  pub fn compute(local: &ContentManifest, remote: &ContentManifest) -> Self {
    let mut plan = Self::default();
    for (path, fingerprint) in local.iter() {
      if remote.get(path) != Some(fingerprint) {
        plan.to_upload.insert(path.clone());
      }
    }
    for path in remote.paths() {
      if !local.contains(path) {
        plan.to_delete.insert(path.clone());
      }
    }
    plan
  }

  /// Every path the plan touches, uploads and deletes alike. Deleted
  /// paths stay cached at the edge until invalidated, so they count.
  pub fn invalidation_paths(&self) -> BTreeSet<String> {
    self.to_upload.union(&self.to_delete).cloned().collect()
  }

  pub fn transfer_count(&self) -> usize {
    self.to_upload.len() + self.to_delete.len()
  }

  pub fn is_empty(&self) -> bool {
    self.to_upload.is_empty() && self.to_delete.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn manifest(entries: &[(&str, &str)]) -> ContentManifest {
    let mut m = ContentManifest::new();
    for (path, fp) in entries {
      m.insert(*path, *fp);
    }
    m
  }

  #[test]
  fn diff_splits_into_uploads_and_deletes() {
    let local = manifest(&[("a", "h1"), ("b", "h2")]);
    let remote = manifest(&[("b", "h2"), ("c", "h3")]);

    let plan = PublishPlan::compute(&local, &remote);
    assert_eq!(plan.to_upload, BTreeSet::from(["a".to_string()]));
    assert_eq!(plan.to_delete, BTreeSet::from(["c".to_string()]));
  }

  #[test]
  fn changed_fingerprint_is_an_upload() {
    let local = manifest(&[("index.html", "new")]);
    let remote = manifest(&[("index.html", "old")]);

    let plan = PublishPlan::compute(&local, &remote);
    assert_eq!(plan.to_upload.len(), 1);
    assert!(plan.to_delete.is_empty());
  }

  #[test]
  fn identical_manifests_need_no_transfers() {
    let local = manifest(&[("a", "h1"), ("b", "h2")]);
    let plan = PublishPlan::compute(&local, &local.clone());
    assert!(plan.is_empty());
    assert!(plan.invalidation_paths().is_empty());
  }

  #[test]
  fn invalidation_paths_union_both_directions() {
    let local = manifest(&[("a", "h1")]);
    let remote = manifest(&[("c", "h3")]);

    let plan = PublishPlan::compute(&local, &remote);
    assert_eq!(
      plan.invalidation_paths(),
      BTreeSet::from(["a".to_string(), "c".to_string()])
    );
  }
}
