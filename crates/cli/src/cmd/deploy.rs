//! Implementation of the `edgeship deploy` command.
//!
//! Runs the full pipeline and prints the run report. Ctrl-C requests
//! cooperative cancellation: whatever stage is running finishes its
//! in-flight work, and the report says where the run stopped.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::warn;

use edgeship_lib::deploy::{RunReport, RunStatus, deploy};
use edgeship_lib::CancelToken;

use crate::output::{print_error, print_info, print_json, print_stat, print_success};

pub fn cmd_deploy(config_path: &Path, json: bool) -> Result<()> {
  let (config, provider) = super::load(config_path)?;

  let cancel = CancelToken::new();
  let started = Instant::now();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(async {
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("cancellation requested, finishing in-flight work");
        ctrl_c.cancel();
      }
    });
    deploy(&config, provider, cancel).await
  })?;

  if json {
    print_json(&report)?;
  } else {
    print_text_report(&report, started);
  }

  match &report.status {
    RunStatus::Complete => Ok(()),
    RunStatus::Failed { stage, cause } => {
      anyhow::bail!("deployment failed in {stage} stage: {cause}")
    }
    RunStatus::Cancelled { stage } => {
      anyhow::bail!("deployment cancelled in {stage} stage")
    }
  }
}

fn print_text_report(report: &RunReport, started: Instant) {
  print_info(&format!("Site: {}", report.site));
  for resource in &report.resources {
    print_stat(resource.id.as_str(), &resource.action);
  }
  println!();
  print_stat("Uploaded", &report.uploaded.len().to_string());
  print_stat("Deleted", &report.deleted.len().to_string());
  print_stat("Invalidated", &report.invalidated_paths.len().to_string());
  if let Some(hostname) = &report.hostname {
    print_stat("Hostname", hostname);
  }

  match &report.status {
    RunStatus::Complete => {
      print_success(&format!(
        "Deployed in {}",
        humantime::format_duration(round_to_millis(started.elapsed()))
      ));
    }
    RunStatus::Failed { stage, cause } => {
      print_error(&format!("Failed in {stage} stage: {cause}"));
      report_stale(report);
    }
    RunStatus::Cancelled { stage } => {
      print_error(&format!("Cancelled in {stage} stage"));
      report_stale(report);
    }
  }
}

fn report_stale(report: &RunReport) {
  if !report.stale_paths.is_empty() {
    print_error(&format!(
      "{} path(s) updated at the origin but still cached at the edge; re-run deploy",
      report.stale_paths.len()
    ));
  }
}

fn round_to_millis(d: std::time::Duration) -> std::time::Duration {
  std::time::Duration::from_millis(d.as_millis() as u64)
}
