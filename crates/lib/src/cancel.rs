//! Cooperative cancellation.
//!
//! A [`CancelToken`] is checked before each new object transfer or
//! invalidation sub-request is issued; in-flight work is allowed to
//! complete. A raised token ends the run with a cancelled status naming
//! the stage it was observed in.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  cancelled: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  /// Raise the cancellation signal. Idempotent.
  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}
