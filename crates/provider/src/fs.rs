//! Filesystem-backed provider.
//!
//! `FsProvider` keeps control-plane resources in a `state.json` under its
//! root directory and stores objects as plain files under
//! `stores/<name>/`. Object fingerprints are recomputed from content on
//! `list`, so the filesystem alone is the source of truth. This backs the
//! CLI and the integration tests; it is not a cloud provider.

use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ProviderError;
use crate::traits::{EdgeCache, ObjectStore, ResourceProvider};
use crate::types::{
  InvalidationStatus, ObjectMeta, PropertyMap, RemoteResource, ResourceKind,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FsInvalidation {
  id: String,
  distribution: String,
  paths: Vec<String>,
  status: InvalidationStatus,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FsState {
  resources: BTreeMap<String, PropertyMap>,
  invalidations: Vec<FsInvalidation>,
  next_id: u64,
}

/// Provider rooted at a local directory.
#[derive(Debug)]
pub struct FsProvider {
  root: PathBuf,
  // Serializes read-modify-write cycles on state.json.
  state_lock: Mutex<()>,
}

fn resource_key(kind: ResourceKind, name: &str) -> String {
  format!("{kind}/{name}")
}

fn hash_reader(mut reader: impl Read) -> std::io::Result<String> {
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

impl FsProvider {
  /// Open (creating if needed) a provider rooted at `root`.
  pub fn open(root: impl Into<PathBuf>) -> Result<Self, ProviderError> {
    let root = root.into();
    fs::create_dir_all(root.join("stores"))?;
    Ok(Self {
      root,
      state_lock: Mutex::new(()),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn state_path(&self) -> PathBuf {
    self.root.join("state.json")
  }

  fn store_dir(&self, store: &str) -> PathBuf {
    self.root.join("stores").join(store)
  }

  fn load_state(&self) -> Result<FsState, ProviderError> {
    let path = self.state_path();
    if !path.exists() {
      return Ok(FsState::default());
    }
    let data = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&data)?)
  }

  fn save_state(&self, state: &FsState) -> Result<(), ProviderError> {
    let data = serde_json::to_string_pretty(state)?;
    fs::write(self.state_path(), data)?;
    Ok(())
  }

  fn with_state<T>(
    &self,
    f: impl FnOnce(&mut FsState) -> Result<T, ProviderError>,
  ) -> Result<T, ProviderError> {
    let _guard = self.state_lock.lock().unwrap();
    let mut state = self.load_state()?;
    let value = f(&mut state)?;
    self.save_state(&state)?;
    Ok(value)
  }

  fn assign_outputs(state: &mut FsState, kind: ResourceKind, name: &str, props: &mut PropertyMap) {
    let mut next = |prefix: &str| {
      state.next_id += 1;
      format!("{prefix}-{}", state.next_id)
    };
    match kind {
      ResourceKind::ObjectStore => {
        props.insert("arn".into(), format!("arn:edge:store:::{name}"));
      }
      ResourceKind::OriginAccessControl => {
        let id = next("oac");
        props.insert("oac_id".into(), id);
      }
      ResourceKind::CdnDistribution => {
        let id = next("dist");
        props.insert("domain_name".into(), format!("{id}.cdn.example.net"));
        props.insert("arn".into(), format!("arn:edge:distribution::{id}"));
        props.insert("distribution_id".into(), id);
      }
      ResourceKind::AccessPolicy => {}
    }
  }
}

impl ResourceProvider for FsProvider {
  fn read_resource(
    &self,
    kind: ResourceKind,
    name: &str,
  ) -> impl Future<Output = Result<Option<RemoteResource>, ProviderError>> + Send {
    async move {
      let _guard = self.state_lock.lock().unwrap();
      let state = self.load_state()?;
      Ok(
        state
          .resources
          .get(&resource_key(kind, name))
          .cloned()
          .map(RemoteResource::new),
      )
    }
  }

  fn create_resource(
    &self,
    kind: ResourceKind,
    name: &str,
    properties: &PropertyMap,
  ) -> impl Future<Output = Result<RemoteResource, ProviderError>> + Send {
    async move {
      debug!(kind = %kind, name, "fs provider create");
      let remote = self.with_state(|state| {
        let key = resource_key(kind, name);
        if state.resources.contains_key(&key) {
          return Err(ProviderError::Rejected {
            kind,
            name: name.to_string(),
            message: "already exists".into(),
          });
        }
        let mut props = properties.clone();
        Self::assign_outputs(state, kind, name, &mut props);
        state.resources.insert(key, props.clone());
        Ok(RemoteResource::new(props))
      })?;
      if kind == ResourceKind::ObjectStore {
        fs::create_dir_all(self.store_dir(name))?;
      }
      Ok(remote)
    }
  }

  fn update_resource(
    &self,
    kind: ResourceKind,
    name: &str,
    changed: &PropertyMap,
  ) -> impl Future<Output = Result<RemoteResource, ProviderError>> + Send {
    async move {
      debug!(kind = %kind, name, "fs provider update");
      self.with_state(|state| {
        let key = resource_key(kind, name);
        let props = state.resources.get_mut(&key).ok_or(ProviderError::ResourceMissing {
          kind,
          name: name.to_string(),
        })?;
        for (k, v) in changed {
          props.insert(k.clone(), v.clone());
        }
        Ok(RemoteResource::new(props.clone()))
      })
    }
  }
}

impl ObjectStore for FsProvider {
  fn list(
    &self,
    store: &str,
    prefix: &str,
  ) -> impl Future<Output = Result<Vec<ObjectMeta>, ProviderError>> + Send {
    async move {
      let dir = self.store_dir(store);
      if !dir.is_dir() {
        return Err(ProviderError::StoreNotFound(store.to_string()));
      }
      let mut listed = Vec::new();
      for entry in WalkDir::new(&dir).sort_by_file_name() {
        let entry = entry.map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        if !entry.file_type().is_file() {
          continue;
        }
        let rel = entry
          .path()
          .strip_prefix(&dir)
          .expect("walked path is under the store dir");
        let path = rel
          .components()
          .map(|c| c.as_os_str().to_string_lossy())
          .collect::<Vec<_>>()
          .join("/");
        if !path.starts_with(prefix) {
          continue;
        }
        let file = fs::File::open(entry.path())?;
        let size = entry.metadata().map_err(|e| ProviderError::Unavailable(e.to_string()))?.len();
        listed.push(ObjectMeta {
          path,
          fingerprint: hash_reader(file)?,
          size,
        });
      }
      Ok(listed)
    }
  }

  fn put(
    &self,
    store: &str,
    path: &str,
    bytes: Vec<u8>,
    _fingerprint: &str,
  ) -> impl Future<Output = Result<(), ProviderError>> + Send {
    async move {
      let dir = self.store_dir(store);
      if !dir.is_dir() {
        return Err(ProviderError::StoreNotFound(store.to_string()));
      }
      let target = dir.join(path);
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::write(target, bytes)?;
      Ok(())
    }
  }

  fn delete(
    &self,
    store: &str,
    path: &str,
  ) -> impl Future<Output = Result<(), ProviderError>> + Send {
    async move {
      let dir = self.store_dir(store);
      if !dir.is_dir() {
        return Err(ProviderError::StoreNotFound(store.to_string()));
      }
      match fs::remove_file(dir.join(path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
      }
    }
  }
}

impl EdgeCache for FsProvider {
  fn create_invalidation(
    &self,
    distribution: &str,
    paths: &[String],
  ) -> impl Future<Output = Result<String, ProviderError>> + Send {
    async move {
      self.with_state(|state| {
        state.next_id += 1;
        let id = format!("inv-{}", state.next_id);
        state.invalidations.push(FsInvalidation {
          id: id.clone(),
          distribution: distribution.to_string(),
          paths: paths.to_vec(),
          status: InvalidationStatus::Completed,
        });
        Ok(id)
      })
    }
  }

  fn invalidation_status(
    &self,
    _distribution: &str,
    invalidation: &str,
  ) -> impl Future<Output = Result<InvalidationStatus, ProviderError>> + Send {
    async move {
      let _guard = self.state_lock.lock().unwrap();
      let state = self.load_state()?;
      state
        .invalidations
        .iter()
        .find(|rec| rec.id == invalidation)
        .map(|rec| rec.status)
        .ok_or_else(|| ProviderError::InvalidationNotFound(invalidation.to_string()))
    }
  }
}
