//! Edge cache invalidation.
//!
//! Takes the set of changed paths after a successful origin sync,
//! normalizes them to absolute cache keys, and submits them in ordered
//! batches bounded by the provider's per-request path limit. Each batch
//! is polled to completion before the next is submitted, so a failure
//! leaves a well-defined prefix of the paths invalidated, and the error
//! carries exactly which paths made it and which did not.

use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use edgeship_provider::{EdgeCache, InvalidationStatus, ProviderError};

use crate::cancel::CancelToken;
use crate::retry::{RetryPolicy, with_backoff};

#[derive(Debug, Error)]
pub enum InvalidateError {
  /// A sub-request failed; `submitted` holds the cache keys already
  /// invalidated, `failed` the ones that were not.
  #[error(
    "invalidation incomplete for '{distribution}' ({} of {} paths invalidated): {cause}",
    .submitted.len(),
    .submitted.len() + .failed.len()
  )]
  Incomplete {
    distribution: String,
    submitted: Vec<String>,
    failed: Vec<String>,
    cause: String,
  },

  /// Cancellation observed before all batches were submitted.
  #[error(
    "invalidation cancelled for '{distribution}' ({} of {} paths invalidated)",
    .submitted.len(),
    .submitted.len() + .failed.len()
  )]
  Cancelled {
    distribution: String,
    submitted: Vec<String>,
    failed: Vec<String>,
  },
}

impl InvalidateError {
  /// Cache keys that were invalidated before the failure.
  pub fn submitted(&self) -> &[String] {
    match self {
      InvalidateError::Incomplete { submitted, .. }
      | InvalidateError::Cancelled { submitted, .. } => submitted,
    }
  }

  /// Cache keys that were not invalidated.
  pub fn failed(&self) -> &[String] {
    match self {
      InvalidateError::Incomplete { failed, .. }
      | InvalidateError::Cancelled { failed, .. } => failed,
    }
  }
}

/// Batching and polling knobs, typically taken from
/// [`DeployConfig`](crate::DeployConfig).
#[derive(Debug, Clone)]
pub struct InvalidateOptions {
  /// Maximum paths per invalidation request.
  pub max_batch: usize,
  pub retry: RetryPolicy,
  pub poll_attempts: u32,
  pub poll_delay: Duration,
  pub cancel: CancelToken,
}

impl Default for InvalidateOptions {
  fn default() -> Self {
    Self {
      max_batch: 1000,
      retry: RetryPolicy::default(),
      poll_attempts: 10,
      poll_delay: Duration::from_millis(200),
      cancel: CancelToken::new(),
    }
  }
}

/// A completed invalidation run.
#[derive(Debug, Default)]
pub struct InvalidationOutcome {
  /// Provider identifiers of the submitted batches, in submission order.
  pub invalidation_ids: Vec<String>,
  /// The normalized cache keys that were invalidated.
  pub paths: Vec<String>,
}

/// Normalize changed object paths to edge cache keys: `/`-rooted,
/// deduplicated, sorted.
pub fn cache_keys(paths: &BTreeSet<String>) -> Vec<String> {
  paths
    .iter()
    .map(|p| {
      if p.starts_with('/') {
        p.clone()
      } else {
        format!("/{p}")
      }
    })
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

/// Invalidate the given changed paths on a distribution.
///
/// Paths are normalized with [`cache_keys`] and split into batches of at
/// most `max_batch`, submitted in order. Submission retries transient
/// errors; each accepted batch is then polled until the edge reports it
/// complete. An empty path set submits nothing and succeeds.
/// Re-invalidating an already-invalidated path is a no-op at the edge,
/// so retrying a failed run from scratch is safe.
pub async fn invalidate<E: EdgeCache>(
  edge: &E,
  distribution: &str,
  paths: &BTreeSet<String>,
  options: &InvalidateOptions,
) -> Result<InvalidationOutcome, InvalidateError> {
  let keys = cache_keys(paths);
  if keys.is_empty() {
    debug!(distribution, "no changed paths, skipping invalidation");
    return Ok(InvalidationOutcome::default());
  }

  let batch_size = options.max_batch.max(1);
  let batches: Vec<&[String]> = keys.chunks(batch_size).collect();
  info!(
    distribution,
    paths = keys.len(),
    batches = batches.len(),
    "invalidating edge cache"
  );

  let mut outcome = InvalidationOutcome::default();
  for (index, batch) in batches.iter().enumerate() {
    if options.cancel.is_cancelled() {
      warn!(distribution, "invalidation cancelled");
      return Err(InvalidateError::Cancelled {
        distribution: distribution.to_string(),
        submitted: outcome.paths,
        failed: remaining(&batches[index..]),
      });
    }

    let complete = submit_and_wait(edge, distribution, batch, options).await;
    match complete {
      Ok(id) => {
        debug!(distribution, invalidation = %id, paths = batch.len(), "batch complete");
        outcome.invalidation_ids.push(id);
        outcome.paths.extend(batch.iter().cloned());
      }
      Err(cause) => {
        return Err(InvalidateError::Incomplete {
          distribution: distribution.to_string(),
          submitted: outcome.paths,
          failed: remaining(&batches[index..]),
          cause,
        });
      }
    }
  }

  Ok(outcome)
}

fn remaining(batches: &[&[String]]) -> Vec<String> {
  batches.iter().flat_map(|b| b.iter().cloned()).collect()
}

/// Submit one batch and poll it until the edge reports `Completed`.
async fn submit_and_wait<E: EdgeCache>(
  edge: &E,
  distribution: &str,
  batch: &[String],
  options: &InvalidateOptions,
) -> Result<String, String> {
  let id = with_backoff(&options.retry, "create_invalidation", || {
    edge.create_invalidation(distribution, batch)
  })
  .await
  .map_err(|e| e.to_string())?;

  let attempts = options.poll_attempts.max(1);
  for attempt in 0..attempts {
    let status = with_backoff(&options.retry, "invalidation_status", || {
      edge.invalidation_status(distribution, &id)
    })
    .await
    .map_err(|e: ProviderError| e.to_string())?;
    match status {
      InvalidationStatus::Completed => return Ok(id),
      InvalidationStatus::Failed => {
        return Err(format!("invalidation {id} was rejected by the edge"));
      }
      InvalidationStatus::Pending => {
        debug!(invalidation = %id, attempt, "invalidation still pending");
        tokio::time::sleep(options.poll_delay).await;
      }
    }
  }
  Err(format!("invalidation {id} did not complete within {attempts} polls"))
}
