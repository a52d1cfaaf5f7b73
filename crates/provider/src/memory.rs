//! In-memory provider for tests.
//!
//! `MemoryProvider` implements all three provider traits against a
//! mutex-guarded map. It additionally offers:
//! - scriptable fault injection (fail the next N calls for a given
//!   operation/key, surfacing `ProviderError::Unavailable`)
//! - scriptable invalidation statuses, so tests can drive the pending,
//!   failed and never-completing poll paths
//! - a mutation log recording every state-changing call, so tests can
//!   assert idempotence (a converged second run issues zero mutations)
//! - inspection helpers for stored objects, resources and invalidations

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Mutex;

use crate::error::ProviderError;
use crate::traits::{EdgeCache, ObjectStore, ResourceProvider};
use crate::types::{
  InvalidationStatus, ObjectMeta, PropertyMap, RemoteResource, ResourceKind,
};

/// One stored object: content plus the fingerprint recorded at put time.
#[derive(Debug, Clone)]
struct StoredObject {
  bytes: Vec<u8>,
  fingerprint: String,
}

/// A recorded invalidation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRecord {
  pub id: String,
  pub distribution: String,
  pub paths: Vec<String>,
  pub status: InvalidationStatus,
}

#[derive(Debug, Default)]
struct Faults {
  read_resource: HashMap<String, u32>,
  create_resource: HashMap<String, u32>,
  update_resource: HashMap<String, u32>,
  list: u32,
  put: HashMap<String, u32>,
  delete: HashMap<String, u32>,
  create_invalidation: u32,
}

#[derive(Debug, Default)]
struct Inner {
  resources: BTreeMap<(ResourceKind, String), PropertyMap>,
  objects: BTreeMap<String, BTreeMap<String, StoredObject>>,
  invalidations: Vec<InvalidationRecord>,
  // Statuses consumed by subsequent create_invalidation calls; empty
  // means records complete immediately.
  invalidation_statuses: Vec<InvalidationStatus>,
  // Status polls a pending record survives before flipping to Completed;
  // 0 means pending records stay pending.
  pending_polls: u32,
  pending_countdown: HashMap<String, u32>,
  next_id: u64,
  faults: Faults,
  mutation_log: Vec<String>,
}

/// In-memory implementation of the provider boundary.
#[derive(Debug, Default)]
pub struct MemoryProvider {
  inner: Mutex<Inner>,
}

fn resource_key(kind: ResourceKind, name: &str) -> String {
  format!("{kind}/{name}")
}

/// Decrement a per-key fault counter; returns true if this call should fail.
fn take_fault(map: &mut HashMap<String, u32>, key: &str) -> bool {
  match map.get_mut(key) {
    Some(n) if *n > 0 => {
      *n -= 1;
      true
    }
    _ => false,
  }
}

fn take_count(counter: &mut u32) -> bool {
  if *counter > 0 {
    *counter -= 1;
    true
  } else {
    false
  }
}

impl MemoryProvider {
  pub fn new() -> Self {
    Self::default()
  }

  /// Pre-create a store so objects can be put without reconciliation.
  pub fn seed_store(&self, name: &str) {
    let mut inner = self.inner.lock().unwrap();
    inner.objects.entry(name.to_string()).or_default();
    inner.resources.entry((ResourceKind::ObjectStore, name.to_string())).or_insert_with(|| {
      let mut props = PropertyMap::new();
      props.insert("name".into(), name.into());
      props.insert("arn".into(), format!("arn:edge:store:::{name}"));
      props
    });
  }

  // === fault injection ===

  pub fn fail_read_resource(&self, kind: ResourceKind, name: &str, times: u32) {
    let mut inner = self.inner.lock().unwrap();
    inner.faults.read_resource.insert(resource_key(kind, name), times);
  }

  pub fn fail_create_resource(&self, kind: ResourceKind, name: &str, times: u32) {
    let mut inner = self.inner.lock().unwrap();
    inner.faults.create_resource.insert(resource_key(kind, name), times);
  }

  pub fn fail_update_resource(&self, kind: ResourceKind, name: &str, times: u32) {
    let mut inner = self.inner.lock().unwrap();
    inner.faults.update_resource.insert(resource_key(kind, name), times);
  }

  pub fn fail_list(&self, times: u32) {
    self.inner.lock().unwrap().faults.list = times;
  }

  pub fn fail_put(&self, path: &str, times: u32) {
    let mut inner = self.inner.lock().unwrap();
    inner.faults.put.insert(path.to_string(), times);
  }

  pub fn fail_delete(&self, path: &str, times: u32) {
    let mut inner = self.inner.lock().unwrap();
    inner.faults.delete.insert(path.to_string(), times);
  }

  pub fn fail_create_invalidation(&self, times: u32) {
    self.inner.lock().unwrap().faults.create_invalidation = times;
  }

  /// Script the status the next invalidation record is created with.
  ///
  /// Calls queue up; each `create_invalidation` consumes one, falling
  /// back to `Completed` when the queue is empty. A `Pending` record
  /// stays pending until [`MemoryProvider::complete_pending_after`] gives
  /// it a poll budget.
  pub fn script_invalidation_status(&self, status: InvalidationStatus) {
    self.inner.lock().unwrap().invalidation_statuses.push(status);
  }

  /// Let scripted `Pending` records flip to `Completed` after surviving
  /// `polls` status reads.
  pub fn complete_pending_after(&self, polls: u32) {
    self.inner.lock().unwrap().pending_polls = polls;
  }

  // === inspection ===

  /// Every mutating call made so far, in order.
  pub fn mutation_log(&self) -> Vec<String> {
    self.inner.lock().unwrap().mutation_log.clone()
  }

  pub fn clear_mutation_log(&self) {
    self.inner.lock().unwrap().mutation_log.clear();
  }

  /// Current remote properties of a resource, if it exists.
  pub fn resource(&self, kind: ResourceKind, name: &str) -> Option<PropertyMap> {
    let inner = self.inner.lock().unwrap();
    inner.resources.get(&(kind, name.to_string())).cloned()
  }

  /// Stored object content and fingerprint.
  pub fn object(&self, store: &str, path: &str) -> Option<(Vec<u8>, String)> {
    let inner = self.inner.lock().unwrap();
    inner
      .objects
      .get(store)
      .and_then(|objs| objs.get(path))
      .map(|o| (o.bytes.clone(), o.fingerprint.clone()))
  }

  /// All object paths currently in a store, sorted.
  pub fn object_paths(&self, store: &str) -> Vec<String> {
    let inner = self.inner.lock().unwrap();
    inner
      .objects
      .get(store)
      .map(|objs| objs.keys().cloned().collect())
      .unwrap_or_default()
  }

  /// All invalidation requests recorded so far, in order of creation.
  pub fn invalidations(&self) -> Vec<InvalidationRecord> {
    self.inner.lock().unwrap().invalidations.clone()
  }

  fn next_id(inner: &mut Inner, prefix: &str) -> String {
    inner.next_id += 1;
    format!("{prefix}-{}", inner.next_id)
  }

  /// Provider-assigned outputs merged into a resource's properties at
  /// create time.
  fn assign_outputs(inner: &mut Inner, kind: ResourceKind, name: &str, props: &mut PropertyMap) {
    match kind {
      ResourceKind::ObjectStore => {
        props.insert("arn".into(), format!("arn:edge:store:::{name}"));
      }
      ResourceKind::OriginAccessControl => {
        let id = Self::next_id(inner, "oac");
        props.insert("oac_id".into(), id);
      }
      ResourceKind::CdnDistribution => {
        let id = Self::next_id(inner, "dist");
        props.insert("domain_name".into(), format!("{id}.cdn.example.net"));
        props.insert("arn".into(), format!("arn:edge:distribution::{id}"));
        props.insert("distribution_id".into(), id);
      }
      ResourceKind::AccessPolicy => {}
    }
  }
}

impl ResourceProvider for MemoryProvider {
  fn read_resource(
    &self,
    kind: ResourceKind,
    name: &str,
  ) -> impl Future<Output = Result<Option<RemoteResource>, ProviderError>> + Send {
    async move {
      let mut inner = self.inner.lock().unwrap();
      let key = resource_key(kind, name);
      if take_fault(&mut inner.faults.read_resource, &key) {
        return Err(ProviderError::Unavailable(format!("read {key}")));
      }
      Ok(
        inner
          .resources
          .get(&(kind, name.to_string()))
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
      let mut inner = self.inner.lock().unwrap();
      let key = resource_key(kind, name);
      if take_fault(&mut inner.faults.create_resource, &key) {
        return Err(ProviderError::Unavailable(format!("create {key}")));
      }
      if inner.resources.contains_key(&(kind, name.to_string())) {
        return Err(ProviderError::Rejected {
          kind,
          name: name.to_string(),
          message: "already exists".into(),
        });
      }
      let mut props = properties.clone();
      Self::assign_outputs(&mut inner, kind, name, &mut props);
      inner.mutation_log.push(format!("create_resource {key}"));
      inner.resources.insert((kind, name.to_string()), props.clone());
      if kind == ResourceKind::ObjectStore {
        inner.objects.entry(name.to_string()).or_default();
      }
      Ok(RemoteResource::new(props))
    }
  }

  fn update_resource(
    &self,
    kind: ResourceKind,
    name: &str,
    changed: &PropertyMap,
  ) -> impl Future<Output = Result<RemoteResource, ProviderError>> + Send {
    async move {
      let mut inner = self.inner.lock().unwrap();
      let key = resource_key(kind, name);
      if take_fault(&mut inner.faults.update_resource, &key) {
        return Err(ProviderError::Unavailable(format!("update {key}")));
      }
      if !inner.resources.contains_key(&(kind, name.to_string())) {
        return Err(ProviderError::ResourceMissing {
          kind,
          name: name.to_string(),
        });
      }
      inner.mutation_log.push(format!("update_resource {key}"));
      let props = inner
        .resources
        .get_mut(&(kind, name.to_string()))
        .expect("checked above");
      for (k, v) in changed {
        props.insert(k.clone(), v.clone());
      }
      let props = props.clone();
      Ok(RemoteResource::new(props))
    }
  }
}

impl ObjectStore for MemoryProvider {
  fn list(
    &self,
    store: &str,
    prefix: &str,
  ) -> impl Future<Output = Result<Vec<ObjectMeta>, ProviderError>> + Send {
    async move {
      let mut inner = self.inner.lock().unwrap();
      if take_count(&mut inner.faults.list) {
        return Err(ProviderError::Unavailable(format!("list {store}")));
      }
      let objects = inner
        .objects
        .get(store)
        .ok_or_else(|| ProviderError::StoreNotFound(store.to_string()))?;
      Ok(
        objects
          .iter()
          .filter(|(path, _)| path.starts_with(prefix))
          .map(|(path, obj)| ObjectMeta {
            path: path.clone(),
            fingerprint: obj.fingerprint.clone(),
            size: obj.bytes.len() as u64,
          })
          .collect(),
      )
    }
  }

  fn put(
    &self,
    store: &str,
    path: &str,
    bytes: Vec<u8>,
    fingerprint: &str,
  ) -> impl Future<Output = Result<(), ProviderError>> + Send {
    async move {
      let mut inner = self.inner.lock().unwrap();
      if take_fault(&mut inner.faults.put, path) {
        return Err(ProviderError::Unavailable(format!("put {path}")));
      }
      if !inner.objects.contains_key(store) {
        return Err(ProviderError::StoreNotFound(store.to_string()));
      }
      inner.mutation_log.push(format!("put {store}/{path}"));
      let objects = inner.objects.get_mut(store).expect("checked above");
      objects.insert(
        path.to_string(),
        StoredObject {
          bytes,
          fingerprint: fingerprint.to_string(),
        },
      );
      Ok(())
    }
  }

  fn delete(
    &self,
    store: &str,
    path: &str,
  ) -> impl Future<Output = Result<(), ProviderError>> + Send {
    async move {
      let mut inner = self.inner.lock().unwrap();
      if take_fault(&mut inner.faults.delete, path) {
        return Err(ProviderError::Unavailable(format!("delete {path}")));
      }
      if !inner.objects.contains_key(store) {
        return Err(ProviderError::StoreNotFound(store.to_string()));
      }
      inner.mutation_log.push(format!("delete {store}/{path}"));
      let objects = inner.objects.get_mut(store).expect("checked above");
      objects.remove(path);
      Ok(())
    }
  }
}

impl EdgeCache for MemoryProvider {
  fn create_invalidation(
    &self,
    distribution: &str,
    paths: &[String],
  ) -> impl Future<Output = Result<String, ProviderError>> + Send {
    async move {
      let mut inner = self.inner.lock().unwrap();
      if take_count(&mut inner.faults.create_invalidation) {
        return Err(ProviderError::Unavailable("create_invalidation".into()));
      }
      let id = Self::next_id(&mut inner, "inv");
      inner
        .mutation_log
        .push(format!("create_invalidation {distribution} {id}"));
      let status = if inner.invalidation_statuses.is_empty() {
        InvalidationStatus::Completed
      } else {
        inner.invalidation_statuses.remove(0)
      };
      if status == InvalidationStatus::Pending && inner.pending_polls > 0 {
        let polls = inner.pending_polls;
        inner.pending_countdown.insert(id.clone(), polls);
      }
      inner.invalidations.push(InvalidationRecord {
        id: id.clone(),
        distribution: distribution.to_string(),
        paths: paths.to_vec(),
        status,
      });
      Ok(id)
    }
  }

  fn invalidation_status(
    &self,
    _distribution: &str,
    invalidation: &str,
  ) -> impl Future<Output = Result<InvalidationStatus, ProviderError>> + Send {
    async move {
      let mut inner = self.inner.lock().unwrap();
      let index = inner
        .invalidations
        .iter()
        .position(|rec| rec.id == invalidation)
        .ok_or_else(|| ProviderError::InvalidationNotFound(invalidation.to_string()))?;
      if let Some(left) = inner.pending_countdown.get_mut(invalidation) {
        if *left > 0 {
          *left -= 1;
          return Ok(InvalidationStatus::Pending);
        }
        inner.pending_countdown.remove(invalidation);
        inner.invalidations[index].status = InvalidationStatus::Completed;
      }
      Ok(inner.invalidations[index].status)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn create_assigns_distribution_outputs() {
    let provider = MemoryProvider::new();
    let mut props = PropertyMap::new();
    props.insert("origin".into(), "site-store".into());

    let remote = provider
      .create_resource(ResourceKind::CdnDistribution, "site-dist", &props)
      .await
      .unwrap();

    assert!(remote.get("distribution_id").is_some());
    assert!(remote.get("domain_name").unwrap().ends_with(".cdn.example.net"));
  }

  #[tokio::test]
  async fn update_missing_resource_fails() {
    let provider = MemoryProvider::new();
    let err = provider
      .update_resource(ResourceKind::AccessPolicy, "nope", &PropertyMap::new())
      .await
      .unwrap_err();
    assert!(matches!(err, ProviderError::ResourceMissing { .. }));
  }

  #[tokio::test]
  async fn put_list_delete_round_trip() {
    let provider = MemoryProvider::new();
    provider.seed_store("site");

    provider
      .put("site", "index.html", b"<html>".to_vec(), "f1")
      .await
      .unwrap();
    let listed = provider.list("site", "").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].path, "index.html");
    assert_eq!(listed[0].fingerprint, "f1");

    provider.delete("site", "index.html").await.unwrap();
    assert!(provider.list("site", "").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn scripted_pending_invalidation_completes_after_polls() {
    let provider = MemoryProvider::new();
    provider.script_invalidation_status(InvalidationStatus::Pending);
    provider.complete_pending_after(2);

    let id = provider
      .create_invalidation("dist-1", &["/index.html".to_string()])
      .await
      .unwrap();
    assert_eq!(
      provider.invalidation_status("dist-1", &id).await.unwrap(),
      InvalidationStatus::Pending
    );
    assert_eq!(
      provider.invalidation_status("dist-1", &id).await.unwrap(),
      InvalidationStatus::Pending
    );
    assert_eq!(
      provider.invalidation_status("dist-1", &id).await.unwrap(),
      InvalidationStatus::Completed
    );
    // Later records fall back to completing immediately.
    let id = provider
      .create_invalidation("dist-1", &["/error.html".to_string()])
      .await
      .unwrap();
    assert_eq!(
      provider.invalidation_status("dist-1", &id).await.unwrap(),
      InvalidationStatus::Completed
    );
  }

  #[tokio::test]
  async fn fault_injection_decrements() {
    let provider = MemoryProvider::new();
    provider.seed_store("site");
    provider.fail_put("a.txt", 2);

    assert!(provider.put("site", "a.txt", vec![], "f").await.is_err());
    assert!(provider.put("site", "a.txt", vec![], "f").await.is_err());
    assert!(provider.put("site", "a.txt", vec![], "f").await.is_ok());
  }

  #[tokio::test]
  async fn mutation_log_records_writes_only() {
    let provider = MemoryProvider::new();
    provider.seed_store("site");

    provider.list("site", "").await.unwrap();
    provider
      .read_resource(ResourceKind::ObjectStore, "site")
      .await
      .unwrap();
    assert!(provider.mutation_log().is_empty());

    provider.put("site", "x", vec![], "f").await.unwrap();
    assert_eq!(provider.mutation_log(), vec!["put site/x".to_string()]);
  }
}
