//! End-to-end pipeline tests against the in-memory provider.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use edgeship_lib::config::{
  DeployConfig, InvalidationConfig, ProviderConfig, SiteConfig, TransferConfig,
};
use edgeship_lib::deploy::{DeployStage, RunStatus, deploy};
use edgeship_lib::{CancelToken, RetryPolicy};
use edgeship_provider::{MemoryProvider, ResourceKind};

fn write_tree(root: &Path, files: &[(&str, &str)]) {
  for (path, contents) in files {
    let full: PathBuf = path.split('/').fold(root.to_path_buf(), |p, s| p.join(s));
    if let Some(parent) = full.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(full, contents).unwrap();
  }
}

fn config(asset_root: &Path) -> DeployConfig {
  DeployConfig {
    site: SiteConfig {
      name: "docs".to_string(),
      region: "eu-central-1".to_string(),
      asset_root: asset_root.to_path_buf(),
    },
    provider: ProviderConfig::default(),
    retry: RetryPolicy::none(),
    transfer: TransferConfig { concurrency: 4 },
    invalidation: InvalidationConfig {
      max_batch: 1000,
      poll_attempts: 3,
      poll_delay: Duration::ZERO,
    },
  }
}

#[tokio::test]
async fn fresh_deployment_provisions_publishes_and_invalidates() {
  let assets = TempDir::new().unwrap();
  write_tree(
    assets.path(),
    &[
      ("index.html", "<html>home</html>"),
      ("error.html", "<html>404</html>"),
      ("assets/app.js", "console.log('hi')"),
    ],
  );
  let provider = Arc::new(MemoryProvider::new());

  let report = deploy(&config(assets.path()), provider.clone(), CancelToken::new())
    .await
    .unwrap();

  assert!(report.status.is_complete(), "status: {:?}", report.status);

  // All four resources created, dependencies first.
  let created: Vec<_> = report.resources.iter().map(|r| r.id.as_str()).collect();
  assert_eq!(created.len(), 4);
  let pos = |id: &str| created.iter().position(|c| *c == id).unwrap();
  assert!(pos("docs") < pos("docs-dist"));
  assert!(pos("docs-oac") < pos("docs-dist"));
  assert!(pos("docs-dist") < pos("docs-policy"));
  assert!(report.resources.iter().all(|r| r.action == "create"));

  // Outputs surfaced in the report.
  let dist_id = report.distribution_id.clone().unwrap();
  assert!(report.hostname.unwrap().ends_with(".cdn.example.net"));

  // All three assets published.
  assert_eq!(
    report.uploaded,
    vec!["assets/app.js", "error.html", "index.html"]
  );
  assert!(report.deleted.is_empty());
  assert_eq!(
    provider.object_paths("docs"),
    vec![
      "assets/app.js".to_string(),
      "error.html".to_string(),
      "index.html".to_string()
    ]
  );

  // Exactly the published paths invalidated, as cache keys.
  assert_eq!(
    report.invalidated_paths,
    vec!["/assets/app.js", "/error.html", "/index.html"]
  );
  let invalidations = provider.invalidations();
  assert_eq!(invalidations.len(), 1);
  assert_eq!(invalidations[0].distribution, dist_id);
  assert!(report.stale_paths.is_empty());
}

#[tokio::test]
async fn second_run_with_no_changes_mutates_nothing() {
  let assets = TempDir::new().unwrap();
  write_tree(assets.path(), &[("index.html", "v1")]);
  let provider = Arc::new(MemoryProvider::new());
  let config = config(assets.path());

  let first = deploy(&config, provider.clone(), CancelToken::new()).await.unwrap();
  assert!(first.status.is_complete());

  provider.clear_mutation_log();
  let second = deploy(&config, provider.clone(), CancelToken::new()).await.unwrap();

  assert!(second.status.is_complete());
  assert!(second.resources.iter().all(|r| r.action == "no-op"));
  assert!(second.uploaded.is_empty());
  assert!(second.invalidation_ids.is_empty());
  assert!(provider.mutation_log().is_empty());
}

#[tokio::test]
async fn changed_content_is_republished_and_invalidated() {
  let assets = TempDir::new().unwrap();
  write_tree(assets.path(), &[("index.html", "v1"), ("old.html", "old")]);
  let provider = Arc::new(MemoryProvider::new());
  let config = config(assets.path());

  deploy(&config, provider.clone(), CancelToken::new()).await.unwrap();

  write_tree(assets.path(), &[("index.html", "v2")]);
  fs::remove_file(assets.path().join("old.html")).unwrap();

  let report = deploy(&config, provider.clone(), CancelToken::new()).await.unwrap();

  assert!(report.status.is_complete());
  assert_eq!(report.uploaded, vec!["index.html"]);
  assert_eq!(report.deleted, vec!["old.html"]);
  // Deleted paths are invalidated too; their cached copies are stale.
  assert_eq!(report.invalidated_paths, vec!["/index.html", "/old.html"]);
}

#[tokio::test]
async fn reconcile_failure_halts_before_any_content_transfer() {
  let assets = TempDir::new().unwrap();
  write_tree(assets.path(), &[("index.html", "v1")]);
  let provider = Arc::new(MemoryProvider::new());
  provider.fail_create_resource(ResourceKind::CdnDistribution, "docs-dist", u32::MAX);

  let report = deploy(&config(assets.path()), provider.clone(), CancelToken::new())
    .await
    .unwrap();

  match &report.status {
    RunStatus::Failed { stage, .. } => assert_eq!(*stage, DeployStage::Reconcile),
    other => panic!("unexpected status: {other:?}"),
  }
  // Store and access control were applied before the halt.
  let applied: Vec<_> = report.resources.iter().map(|r| r.id.as_str()).collect();
  assert_eq!(applied, vec!["docs", "docs-oac"]);
  // No content moved and nothing was invalidated.
  assert!(report.uploaded.is_empty());
  assert!(provider.object_paths("docs").is_empty());
  assert!(provider.invalidations().is_empty());
}

#[tokio::test]
async fn partial_sync_failure_skips_invalidation_and_reports_stale_paths() {
  let assets = TempDir::new().unwrap();
  write_tree(assets.path(), &[("x.html", "x"), ("y.html", "y")]);
  let provider = Arc::new(MemoryProvider::new());
  provider.fail_put("x.html", u32::MAX);

  let report = deploy(&config(assets.path()), provider.clone(), CancelToken::new())
    .await
    .unwrap();

  match &report.status {
    RunStatus::Failed { stage, .. } => assert_eq!(*stage, DeployStage::Sync),
    other => panic!("unexpected status: {other:?}"),
  }
  assert_eq!(report.uploaded, vec!["y.html"]);
  assert_eq!(report.failed_paths, vec!["x.html"]);
  // The edge was never told about y.html, so it is reported stale and
  // no invalidation was submitted at all.
  assert_eq!(report.stale_paths, vec!["y.html"]);
  assert!(provider.invalidations().is_empty());
}

#[tokio::test]
async fn invalidation_failure_still_leaves_origin_committed() {
  let assets = TempDir::new().unwrap();
  write_tree(assets.path(), &[("index.html", "v1")]);
  let provider = Arc::new(MemoryProvider::new());
  provider.fail_create_invalidation(u32::MAX);

  let report = deploy(&config(assets.path()), provider.clone(), CancelToken::new())
    .await
    .unwrap();

  match &report.status {
    RunStatus::Failed { stage, .. } => assert_eq!(*stage, DeployStage::Invalidate),
    other => panic!("unexpected status: {other:?}"),
  }
  // Origin commit happened before the invalidation attempt.
  assert_eq!(report.uploaded, vec!["index.html"]);
  assert!(provider.object("docs", "index.html").is_some());
  // The stale path is called out for the operator, as a cache key.
  assert_eq!(report.stale_paths, vec!["/index.html"]);
  assert!(report.invalidated_paths.is_empty());
  assert!(report.invalidation_ids.is_empty());
}

#[tokio::test]
async fn pre_cancelled_run_does_nothing() {
  let assets = TempDir::new().unwrap();
  write_tree(assets.path(), &[("index.html", "v1")]);
  let provider = Arc::new(MemoryProvider::new());

  let cancel = CancelToken::new();
  cancel.cancel();
  let report = deploy(&config(assets.path()), provider.clone(), cancel)
    .await
    .unwrap();

  match &report.status {
    RunStatus::Cancelled { stage } => assert_eq!(*stage, DeployStage::Reconcile),
    other => panic!("unexpected status: {other:?}"),
  }
  assert!(report.resources.is_empty());
  assert!(provider.mutation_log().is_empty());
}

#[tokio::test]
async fn drifted_resource_is_updated_in_place() {
  let assets = TempDir::new().unwrap();
  write_tree(assets.path(), &[("index.html", "v1")]);
  let provider = Arc::new(MemoryProvider::new());
  let config = config(assets.path());

  deploy(&config, provider.clone(), CancelToken::new()).await.unwrap();

  // Drift the distribution's root object out from under us.
  let dist_props = provider
    .resource(ResourceKind::CdnDistribution, "docs-dist")
    .unwrap();
  assert_eq!(dist_props.get("default_root_object").map(String::as_str), Some("index.html"));
  {
    use edgeship_provider::{PropertyMap, ResourceProvider};
    let mut changed = PropertyMap::new();
    changed.insert("default_root_object".into(), "main.html".into());
    provider
      .update_resource(ResourceKind::CdnDistribution, "docs-dist", &changed)
      .await
      .unwrap();
  }

  let report = deploy(&config, provider.clone(), CancelToken::new()).await.unwrap();
  assert!(report.status.is_complete());
  let dist = report
    .resources
    .iter()
    .find(|r| r.id.as_str() == "docs-dist")
    .unwrap();
  assert!(dist.action.starts_with("update"), "action: {}", dist.action);
  let repaired = provider
    .resource(ResourceKind::CdnDistribution, "docs-dist")
    .unwrap();
  assert_eq!(repaired.get("default_root_object").map(String::as_str), Some("index.html"));
}

#[tokio::test]
async fn report_serializes_to_json() {
  let assets = TempDir::new().unwrap();
  write_tree(assets.path(), &[("index.html", "v1")]);
  let provider = Arc::new(MemoryProvider::new());

  let report = deploy(&config(assets.path()), provider, CancelToken::new())
    .await
    .unwrap();

  let json = serde_json::to_value(&report).unwrap();
  assert_eq!(json["site"], "docs");
  assert_eq!(json["status"]["status"], "complete");
  assert_eq!(json["store"], "docs");
  assert_eq!(json["uploaded"][0], "index.html");
}

#[tokio::test]
async fn invalidation_batches_respect_the_configured_limit() {
  let assets = TempDir::new().unwrap();
  let files: Vec<(String, String)> = (0..5)
    .map(|i| (format!("page-{i}.html"), format!("page {i}")))
    .collect();
  let refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
  write_tree(assets.path(), &refs);

  let provider = Arc::new(MemoryProvider::new());
  let mut config = config(assets.path());
  config.invalidation.max_batch = 2;

  let report = deploy(&config, provider.clone(), CancelToken::new()).await.unwrap();

  assert!(report.status.is_complete());
  assert_eq!(report.invalidation_ids.len(), 3);
  let all: BTreeSet<String> = provider
    .invalidations()
    .iter()
    .flat_map(|rec| rec.paths.clone())
    .collect();
  assert_eq!(all.len(), 5);
}
