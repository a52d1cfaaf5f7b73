//! Content synchronizer.
//!
//! Makes the origin store byte-identical to the local asset tree:
//! fingerprint both sides, diff into a [`PublishPlan`], then run the
//! transfers with bounded concurrency. Uploads complete (or fail) before
//! any delete is issued, so a failed run never removes an object whose
//! replacement did not land.

mod manifest;
mod plan;

pub use manifest::{ContentManifest, local_manifest, remote_manifest};
pub use plan::PublishPlan;

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use edgeship_provider::{ObjectStore, ProviderError};

use crate::cancel::CancelToken;
use crate::retry::{RetryPolicy, with_backoff};
use crate::util::hash::hash_bytes;

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("asset root does not exist or is not a directory: {0}")]
  AssetRootMissing(PathBuf),

  #[error("failed to walk asset tree: {0}")]
  Walk(String),

  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to list store '{store}': {source}")]
  List {
    store: String,
    #[source]
    source: ProviderError,
  },
}

/// Transfer knobs, typically taken from [`DeployConfig`](crate::DeployConfig).
#[derive(Debug, Clone)]
pub struct SyncOptions {
  pub concurrency: usize,
  pub retry: RetryPolicy,
  pub cancel: CancelToken,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      concurrency: 8,
      retry: RetryPolicy::default(),
      cancel: CancelToken::new(),
    }
  }
}

/// A transfer that exhausted its retries.
#[derive(Debug, Clone)]
pub struct FailedTransfer {
  pub path: String,
  pub error: String,
}

/// What a sync run actually did to the origin.
#[derive(Debug, Default)]
pub struct SyncOutcome {
  pub uploaded: Vec<String>,
  pub deleted: Vec<String>,
  pub failed: Vec<FailedTransfer>,
  /// Transfers never issued, because of cancellation or because the
  /// delete phase was skipped after an upload failure.
  pub skipped: Vec<String>,
  pub cancelled: bool,
}

impl SyncOutcome {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty() && !self.cancelled
  }

  /// Paths whose origin state actually changed this run. Only these are
  /// eligible for edge invalidation; failed or skipped transfers left
  /// the origin (and therefore the cache) as it was.
  pub fn changed_paths(&self) -> BTreeSet<String> {
    self
      .uploaded
      .iter()
      .chain(self.deleted.iter())
      .cloned()
      .collect()
  }
}

/// Execute a publish plan against the origin store.
///
/// Uploads run first, `concurrency` at a time, each path retried
/// independently per the policy. The delete phase only starts once every
/// upload has succeeded; a failed upload downgrades deletes to skipped so
/// the origin keeps serving the old objects. Cancellation stops new
/// transfers from being issued; in-flight ones run to completion.
pub async fn execute_plan<S: ObjectStore + 'static>(
  store: Arc<S>,
  store_name: &str,
  asset_root: &Path,
  plan: &PublishPlan,
  options: &SyncOptions,
) -> Result<SyncOutcome, SyncError> {
  let mut outcome = SyncOutcome::default();
  if plan.is_empty() {
    debug!(store = store_name, "origin already up to date");
    return Ok(outcome);
  }

  info!(
    store = store_name,
    uploads = plan.to_upload.len(),
    deletes = plan.to_delete.len(),
    "syncing content"
  );

  let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));

  let mut join_set: JoinSet<(String, Result<(), String>)> = JoinSet::new();
  for path in &plan.to_upload {
    let permit = semaphore
      .clone()
      .acquire_owned()
      .await
      .expect("semaphore is never closed");
    // Checked after acquiring, so a cancellation raised while waiting on
    // in-flight transfers is seen before the next one is issued.
    if options.cancel.is_cancelled() {
      outcome.cancelled = true;
      outcome.skipped.push(path.clone());
      continue;
    }
    let store = store.clone();
    let store_name = store_name.to_string();
    let retry = options.retry.clone();
    let local = local_path(asset_root, path);
    let path = path.clone();
    join_set.spawn(async move {
      let _permit = permit;
      let result = upload_one(&*store, &store_name, &path, &local, &retry).await;
      (path, result)
    });
  }
  collect_phase(&mut join_set, &mut outcome.uploaded, &mut outcome.failed).await;

  if !outcome.failed.is_empty() || outcome.cancelled {
    // Leave stale remote objects in place rather than delete alongside
    // a partial upload.
    warn!(
      failed = outcome.failed.len(),
      cancelled = outcome.cancelled,
      "upload phase incomplete, skipping deletes"
    );
    outcome.skipped.extend(plan.to_delete.iter().cloned());
    return Ok(outcome);
  }

  let mut join_set: JoinSet<(String, Result<(), String>)> = JoinSet::new();
  for path in &plan.to_delete {
    let permit = semaphore
      .clone()
      .acquire_owned()
      .await
      .expect("semaphore is never closed");
    if options.cancel.is_cancelled() {
      outcome.cancelled = true;
      outcome.skipped.push(path.clone());
      continue;
    }
    let store = store.clone();
    let store_name = store_name.to_string();
    let retry = options.retry.clone();
    let path = path.clone();
    join_set.spawn(async move {
      let _permit = permit;
      let result = with_backoff(&retry, "delete", || store.delete(&store_name, &path))
        .await
        .map_err(|e| e.to_string());
      (path, result)
    });
  }
  collect_phase(&mut join_set, &mut outcome.deleted, &mut outcome.failed).await;

  Ok(outcome)
}

async fn upload_one<S: ObjectStore>(
  store: &S,
  store_name: &str,
  path: &str,
  local: &Path,
  retry: &RetryPolicy,
) -> Result<(), String> {
  let bytes = tokio::fs::read(local)
    .await
    .map_err(|e| format!("read {}: {e}", local.display()))?;
  let fingerprint = hash_bytes(&bytes);
  with_backoff(retry, "put", || {
    store.put(store_name, path, bytes.clone(), &fingerprint)
  })
  .await
  .map_err(|e| e.to_string())
}

async fn collect_phase(
  join_set: &mut JoinSet<(String, Result<(), String>)>,
  completed: &mut Vec<String>,
  failed: &mut Vec<FailedTransfer>,
) {
  while let Some(joined) = join_set.join_next().await {
    let (path, result) = joined.expect("transfer task does not panic");
    match result {
      Ok(()) => {
        debug!(path, "transfer complete");
        completed.push(path);
      }
      Err(error) => {
        warn!(path, error, "transfer failed");
        failed.push(FailedTransfer { path, error });
      }
    }
  }
  completed.sort();
  failed.sort_by(|a, b| a.path.cmp(&b.path));
}

fn local_path(root: &Path, rel: &str) -> PathBuf {
  rel.split('/').fold(root.to_path_buf(), |p, seg| p.join(seg))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use std::future::Future;
  use tempfile::TempDir;

  use edgeship_provider::MemoryProvider;

  fn options() -> SyncOptions {
    SyncOptions {
      concurrency: 4,
      retry: RetryPolicy::none(),
      cancel: CancelToken::new(),
    }
  }

  fn asset_tree(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for (path, contents) in files {
      let full = local_path(temp.path(), path);
      if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).unwrap();
      }
      fs::write(full, contents).unwrap();
    }
    temp
  }

  async fn plan_for(provider: &Arc<MemoryProvider>, root: &Path) -> PublishPlan {
    let local = local_manifest(root).unwrap();
    let remote = remote_manifest(&**provider, "site", &RetryPolicy::none())
      .await
      .unwrap();
    PublishPlan::compute(&local, &remote)
  }

  #[tokio::test]
  async fn uploads_new_files_and_deletes_removed_ones() {
    let provider = Arc::new(MemoryProvider::new());
    provider.seed_store("site");
    provider
      .put("site", "old.html", b"gone".to_vec(), "h-old")
      .await
      .unwrap();

    let tree = asset_tree(&[("index.html", "<html>"), ("assets/app.js", "js")]);
    let plan = plan_for(&provider, tree.path()).await;

    let outcome = execute_plan(provider.clone(), "site", tree.path(), &plan, &options())
      .await
      .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.uploaded, vec!["assets/app.js", "index.html"]);
    assert_eq!(outcome.deleted, vec!["old.html"]);
    assert_eq!(
      provider.object_paths("site"),
      vec!["assets/app.js".to_string(), "index.html".to_string()]
    );
  }

  #[tokio::test]
  async fn second_run_is_a_noop() {
    let provider = Arc::new(MemoryProvider::new());
    provider.seed_store("site");
    let tree = asset_tree(&[("index.html", "<html>")]);

    let plan = plan_for(&provider, tree.path()).await;
    execute_plan(provider.clone(), "site", tree.path(), &plan, &options())
      .await
      .unwrap();

    provider.clear_mutation_log();
    let plan = plan_for(&provider, tree.path()).await;
    assert!(plan.is_empty());
    let outcome = execute_plan(provider.clone(), "site", tree.path(), &plan, &options())
      .await
      .unwrap();
    assert!(outcome.is_success());
    assert!(outcome.changed_paths().is_empty());
    assert!(provider.mutation_log().is_empty());
  }

  #[tokio::test]
  async fn failed_upload_skips_the_delete_phase() {
    let provider = Arc::new(MemoryProvider::new());
    provider.seed_store("site");
    provider
      .put("site", "stale.html", b"stale".to_vec(), "h-stale")
      .await
      .unwrap();
    // Retries are disabled in `options()`, so one fault is enough.
    provider.fail_put("bad.css", u32::MAX);

    let tree = asset_tree(&[("bad.css", "body{}"), ("good.html", "<html>")]);
    let plan = plan_for(&provider, tree.path()).await;

    let outcome = execute_plan(provider.clone(), "site", tree.path(), &plan, &options())
      .await
      .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.uploaded, vec!["good.html"]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].path, "bad.css");
    assert_eq!(outcome.skipped, vec!["stale.html"]);
    assert!(outcome.deleted.is_empty());
    // The stale object survives the failed run.
    assert!(provider.object("site", "stale.html").is_some());
    // Only the successful upload is eligible for invalidation.
    assert_eq!(outcome.changed_paths(), BTreeSet::from(["good.html".to_string()]));
  }

  #[tokio::test]
  async fn transient_put_failure_is_retried() {
    let provider = Arc::new(MemoryProvider::new());
    provider.seed_store("site");
    provider.fail_put("index.html", 2);

    let tree = asset_tree(&[("index.html", "<html>")]);
    let plan = plan_for(&provider, tree.path()).await;

    let mut opts = options();
    opts.retry = RetryPolicy {
      attempts: 3,
      base_delay: std::time::Duration::from_millis(1),
      max_delay: std::time::Duration::from_millis(5),
    };
    let outcome = execute_plan(provider.clone(), "site", tree.path(), &plan, &opts)
      .await
      .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.uploaded, vec!["index.html"]);
  }

  /// Store wrapper that raises the token as soon as a put lands, so the
  /// run is cancelled while transfers are still being issued.
  struct CancelAfterPut {
    inner: MemoryProvider,
    cancel: CancelToken,
  }

  impl ObjectStore for CancelAfterPut {
    fn list(
      &self,
      store: &str,
      prefix: &str,
    ) -> impl Future<Output = Result<Vec<edgeship_provider::ObjectMeta>, ProviderError>> + Send
    {
      self.inner.list(store, prefix)
    }

    fn put(
      &self,
      store: &str,
      path: &str,
      bytes: Vec<u8>,
      fingerprint: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send {
      async move {
        let result = self.inner.put(store, path, bytes, fingerprint).await;
        self.cancel.cancel();
        result
      }
    }

    fn delete(
      &self,
      store: &str,
      path: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send {
      self.inner.delete(store, path)
    }
  }

  #[tokio::test]
  async fn cancellation_mid_run_completes_in_flight_transfers_only() {
    let inner = MemoryProvider::new();
    inner.seed_store("site");
    let cancel = CancelToken::new();
    let store = Arc::new(CancelAfterPut {
      inner,
      cancel: cancel.clone(),
    });

    let tree = asset_tree(&[("a.html", "a"), ("b.html", "b"), ("c.html", "c")]);
    let local = local_manifest(tree.path()).unwrap();
    let plan = PublishPlan::compute(&local, &ContentManifest::new());

    let mut opts = options();
    opts.concurrency = 1;
    opts.cancel = cancel;
    let outcome = execute_plan(store.clone(), "site", tree.path(), &plan, &opts)
      .await
      .unwrap();

    assert!(outcome.cancelled);
    // The transfer in flight when the token was raised ran to
    // completion; nothing new was issued after it.
    assert_eq!(outcome.uploaded, vec!["a.html"]);
    assert_eq!(outcome.skipped, vec!["b.html", "c.html"]);
    assert!(outcome.failed.is_empty());
    assert!(store.inner.object("site", "a.html").is_some());
    assert!(store.inner.object("site", "b.html").is_none());
  }

  #[tokio::test]
  async fn failed_delete_is_reported_with_uploads_intact() {
    let provider = Arc::new(MemoryProvider::new());
    provider.seed_store("site");
    provider
      .put("site", "old.html", b"gone".to_vec(), "h-old")
      .await
      .unwrap();
    provider.fail_delete("old.html", u32::MAX);

    let tree = asset_tree(&[("new.html", "<html>")]);
    let plan = plan_for(&provider, tree.path()).await;

    let outcome = execute_plan(provider.clone(), "site", tree.path(), &plan, &options())
      .await
      .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.uploaded, vec!["new.html"]);
    assert!(outcome.deleted.is_empty());
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].path, "old.html");
    // The upload is committed and eligible for invalidation; the
    // undeleted object is not.
    assert!(provider.object("site", "new.html").is_some());
    assert!(provider.object("site", "old.html").is_some());
    assert_eq!(outcome.changed_paths(), BTreeSet::from(["new.html".to_string()]));
  }

  #[tokio::test]
  async fn cancellation_stops_issuing_transfers() {
    let provider = Arc::new(MemoryProvider::new());
    provider.seed_store("site");
    let tree = asset_tree(&[("a.html", "a"), ("b.html", "b")]);
    let plan = plan_for(&provider, tree.path()).await;

    let mut opts = options();
    opts.cancel.cancel();
    let outcome = execute_plan(provider.clone(), "site", tree.path(), &plan, &opts)
      .await
      .unwrap();

    assert!(outcome.cancelled);
    assert!(!outcome.is_success());
    assert!(outcome.uploaded.is_empty());
    assert_eq!(outcome.skipped, vec!["a.html", "b.html"]);
    assert!(provider.mutation_log().is_empty());
  }
}
