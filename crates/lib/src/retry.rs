//! Bounded retry with exponential backoff.
//!
//! Only transient provider errors are retried; everything else surfaces
//! immediately. Read-only calls and individual object transfers are safe
//! to repeat, which is why the policy lives here rather than in the
//! provider.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use edgeship_provider::ProviderError;

/// Retry policy: total attempts and exponential backoff delays.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts, including the first (minimum 1).
  pub attempts: u32,
  /// Delay before the first retry.
  #[serde(rename = "base_delay_ms", with = "millis")]
  pub base_delay: Duration,
  /// Cap on the backoff delay.
  #[serde(rename = "max_delay_ms", with = "millis")]
  pub max_delay: Duration,
}

mod millis {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer};

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    Ok(Duration::from_millis(u64::deserialize(d)?))
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      attempts: 3,
      base_delay: Duration::from_millis(200),
      max_delay: Duration::from_secs(5),
    }
  }
}

impl RetryPolicy {
  /// No retries, no delays. Useful in tests.
  pub fn none() -> Self {
    Self {
      attempts: 1,
      base_delay: Duration::ZERO,
      max_delay: Duration::ZERO,
    }
  }

  /// Delay before the given retry (1-based), doubling per attempt.
  pub fn delay_for(&self, retry: u32) -> Duration {
    let factor = 1u32 << retry.saturating_sub(1).min(16);
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }
}

/// Run `op` up to `policy.attempts` times, sleeping between attempts.
///
/// Returns the first success, the first non-transient error, or the last
/// transient error once attempts are exhausted.
pub async fn with_backoff<T, F, Fut>(
  policy: &RetryPolicy,
  op_name: &str,
  mut op: F,
) -> Result<T, ProviderError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, ProviderError>>,
{
  let attempts = policy.attempts.max(1);
  let mut retry = 0u32;
  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(e) if e.is_transient() && retry + 1 < attempts => {
        retry += 1;
        let delay = policy.delay_for(retry);
        warn!(op = op_name, retry, delay_ms = delay.as_millis() as u64, error = %e, "transient provider error, retrying");
        tokio::time::sleep(delay).await;
      }
      Err(e) => return Err(e),
    }
  }
}
