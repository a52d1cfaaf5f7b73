//! Error type for provider operations.

use thiserror::Error;

use crate::types::ResourceKind;

/// Errors surfaced by a provider implementation.
///
/// Only [`ProviderError::Unavailable`] is transient; callers retry it
/// with bounded backoff. Every other variant is fatal for the current
/// operation and propagates immediately.
#[derive(Debug, Error)]
pub enum ProviderError {
  /// Transport-level failure; the call is safe to repeat.
  #[error("provider unavailable: {0}")]
  Unavailable(String),

  /// The named store does not exist.
  #[error("store not found: {0}")]
  StoreNotFound(String),

  /// The named object does not exist in the store.
  #[error("object not found in {store}: {path}")]
  ObjectNotFound { store: String, path: String },

  /// A mutation the provider refuses to perform.
  #[error("{kind} '{name}' rejected: {message}")]
  Rejected {
    kind: ResourceKind,
    name: String,
    message: String,
  },

  /// Update issued against a resource that does not exist.
  #[error("{kind} '{name}' does not exist")]
  ResourceMissing { kind: ResourceKind, name: String },

  /// Unknown invalidation identifier.
  #[error("invalidation not found: {0}")]
  InvalidationNotFound(String),

  /// Local I/O failure in a filesystem-backed provider.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// Corrupt or unreadable provider state.
  #[error("state error: {0}")]
  State(#[from] serde_json::Error),
}

impl ProviderError {
  /// Whether the error is safe to retry.
  pub fn is_transient(&self) -> bool {
    matches!(self, ProviderError::Unavailable(_))
  }
}
