//! Declarative resource descriptors.
//!
//! A [`ResourceDescriptor`] is the desired state of one infrastructure
//! resource; property values are either literals or references to another
//! resource's output attribute. A [`DescriptorSet`] is a validated
//! collection: every reference names an existing descriptor and ids are
//! unique. Descriptors are immutable once loaded for a run.

pub mod topology;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

pub use edgeship_provider::ResourceKind;

/// Identity of a descriptor (and of the remote resource it declares).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for ResourceId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ResourceId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

/// A desired property value: a literal, or another resource's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
  /// Deferred reference, resolved only after the referenced resource has
  /// been applied in the same pass.
  Reference {
    resource: ResourceId,
    attribute: String,
  },
  Literal(String),
}

impl PropertyValue {
  pub fn literal(value: impl Into<String>) -> Self {
    PropertyValue::Literal(value.into())
  }

  pub fn reference(resource: impl Into<ResourceId>, attribute: impl Into<String>) -> Self {
    PropertyValue::Reference {
      resource: resource.into(),
      attribute: attribute.into(),
    }
  }
}

impl From<String> for ResourceId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

/// Declarative description of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
  pub id: ResourceId,
  pub kind: ResourceKind,
  pub properties: BTreeMap<String, PropertyValue>,
}

impl ResourceDescriptor {
  pub fn new(id: impl Into<ResourceId>, kind: ResourceKind) -> Self {
    Self {
      id: id.into(),
      kind,
      properties: BTreeMap::new(),
    }
  }

  /// Builder-style property insertion.
  pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
    self.properties.insert(name.into(), value);
    self
  }

  /// Ids of the resources this descriptor's properties depend on.
  pub fn references(&self) -> BTreeSet<&ResourceId> {
    self
      .properties
      .values()
      .filter_map(|value| match value {
        PropertyValue::Reference { resource, .. } => Some(resource),
        PropertyValue::Literal(_) => None,
      })
      .collect()
  }
}

/// A validated set of descriptors, keyed by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSet {
  descriptors: BTreeMap<ResourceId, ResourceDescriptor>,
}

impl DescriptorSet {
  /// Validate and index a list of descriptors.
  ///
  /// Fails on duplicate ids and on references to unknown ids. No side
  /// effects; no provider calls.
  pub fn new(descriptors: Vec<ResourceDescriptor>) -> Result<Self, ConfigError> {
    let mut indexed = BTreeMap::new();
    for descriptor in descriptors {
      let id = descriptor.id.clone();
      if indexed.insert(id.clone(), descriptor).is_some() {
        return Err(ConfigError::DuplicateId(id));
      }
    }

    for descriptor in indexed.values() {
      for reference in descriptor.references() {
        if !indexed.contains_key(reference) {
          return Err(ConfigError::UnknownReference {
            resource: descriptor.id.clone(),
            reference: reference.clone(),
          });
        }
      }
    }

    Ok(Self { descriptors: indexed })
  }

  pub fn get(&self, id: &ResourceId) -> Option<&ResourceDescriptor> {
    self.descriptors.get(id)
  }

  pub fn ids(&self) -> impl Iterator<Item = &ResourceId> {
    self.descriptors.keys()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
    self.descriptors.values()
  }

  pub fn len(&self) -> usize {
    self.descriptors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.descriptors.is_empty()
  }
}
