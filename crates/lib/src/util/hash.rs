//! Hashing utilities for content fingerprints and applied-state hashes.
//!
//! This module provides:
//! - `Fingerprint`: full 64-character SHA-256 hex of object content
//! - `hash_file()` / `hash_bytes()`: fingerprint computation
//! - `Hashable`: truncated hash of a JSON-serialized value, used to
//!   record what was last applied to a resource

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the truncated applied-state hash.
const APPLIED_HASH_LEN: usize = 20;

/// A content-derived fingerprint: lowercase SHA-256 hex, 64 characters.
pub type Fingerprint = String;

/// Compute the fingerprint of a file's contents.
pub fn hash_file(path: &Path) -> std::io::Result<Fingerprint> {
  let file = File::open(path)?;
  let mut reader = BufReader::new(file);
  let mut hasher = Sha256::new();

  let mut buffer = [0u8; 8192];
  loop {
    let n = reader.read(&mut buffer)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(hex::encode(hasher.finalize()))
}

/// Compute the fingerprint of a byte slice.
pub fn hash_bytes(data: &[u8]) -> Fingerprint {
  let mut hasher = Sha256::new();
  hasher.update(data);
  hex::encode(hasher.finalize())
}

/// A truncated 20-character hash identifying an applied property set.
///
/// Kept on the in-memory resource state after a successful apply; never
/// persisted, since the remote is the source of truth across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppliedHash(pub String);

impl std::fmt::Display for AppliedHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<AppliedHash, serde_json::Error> {
    let serialized = serde_json::to_string(self)?;
    let full = hash_bytes(serialized.as_bytes());
    Ok(AppliedHash(full[..APPLIED_HASH_LEN].to_string()))
  }
}

impl<T: Serialize> Hashable for T {}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;
  use std::io::Write;
  use tempfile::NamedTempFile;

  #[test]
  fn hash_bytes_known_vector() {
    assert_eq!(
      hash_bytes(b"hello world"),
      "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
  }

  #[test]
  fn hash_file_matches_hash_bytes() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"hello world").unwrap();
    file.flush().unwrap();

    assert_eq!(hash_file(file.path()).unwrap(), hash_bytes(b"hello world"));
  }

  #[test]
  fn applied_hash_is_deterministic_and_truncated() {
    let mut props = BTreeMap::new();
    props.insert("name", "site");
    let a = props.compute_hash().unwrap();
    let b = props.compute_hash().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.0.len(), APPLIED_HASH_LEN);
  }
}
