//! Deployment configuration.
//!
//! All tunables come from a plain key/value TOML file (`edgeship.toml`):
//! target site name and region, the local asset root, retry/backoff
//! parameters, transfer concurrency, and invalidation batching. Every
//! section except `[site]` has defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::descriptor::ResourceId;
use crate::retry::RetryPolicy;

/// Static configuration and descriptor-validation errors.
///
/// These fail before any remote call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("duplicate resource id: {0}")]
  DuplicateId(ResourceId),

  #[error("resource '{resource}' references unknown resource '{reference}'")]
  UnknownReference {
    resource: ResourceId,
    reference: ResourceId,
  },
}

/// Top-level deployment configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
  pub site: SiteConfig,
  #[serde(default)]
  pub provider: ProviderConfig,
  #[serde(default)]
  pub retry: RetryPolicy,
  #[serde(default)]
  pub transfer: TransferConfig,
  #[serde(default)]
  pub invalidation: InvalidationConfig,
}

/// The target site: resource names, region, local assets.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
  /// Site name; also the origin store identifier.
  pub name: String,
  /// Provider region the resources live in.
  #[serde(default = "default_region")]
  pub region: String,
  /// Root of the local asset tree to publish.
  pub asset_root: PathBuf,
}

/// Where the provider keeps its state (filesystem provider only).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
  /// Root directory for provider state; defaults to `.edgeship` next to
  /// the config file.
  pub root: Option<PathBuf>,
}

/// Object transfer tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
  /// Maximum concurrent object transfers.
  pub concurrency: usize,
}

impl Default for TransferConfig {
  fn default() -> Self {
    Self { concurrency: 8 }
  }
}

/// Edge invalidation tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvalidationConfig {
  /// Maximum paths per invalidation sub-request.
  pub max_batch: usize,
  /// How many times to poll a pending invalidation before giving up.
  pub poll_attempts: u32,
  /// Delay between status polls.
  #[serde(rename = "poll_delay_ms", deserialize_with = "duration_millis")]
  pub poll_delay: Duration,
}

impl Default for InvalidationConfig {
  fn default() -> Self {
    Self {
      max_batch: 1000,
      poll_attempts: 10,
      poll_delay: Duration::from_millis(200),
    }
  }
}

fn default_region() -> String {
  "eu-central-1".to_string()
}

fn duration_millis<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
  Ok(Duration::from_millis(u64::deserialize(d)?))
}

impl DeployConfig {
  /// Load configuration from a TOML file.
  ///
  /// Relative `site.asset_root` and `provider.root` paths are resolved
  /// against the config file's directory; `provider.root` defaults to
  /// `.edgeship` there.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config: DeployConfig = toml::from_str(&data).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    let base = path.parent().unwrap_or(Path::new("."));
    if config.site.asset_root.is_relative() {
      config.site.asset_root = base.join(&config.site.asset_root);
    }
    config.provider.root = Some(match config.provider.root.take() {
      Some(root) if root.is_relative() => base.join(root),
      Some(root) => root,
      None => base.join(".edgeship"),
    });

    Ok(config)
  }

  /// Provider state root (always set after [`DeployConfig::load`]).
  pub fn provider_root(&self) -> PathBuf {
    self.provider.root.clone().unwrap_or_else(|| PathBuf::from(".edgeship"))
  }
}
