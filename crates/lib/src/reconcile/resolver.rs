//! Deferred reference resolution.
//!
//! Property values referencing another resource's output are resolved
//! against the remote states accumulated earlier in the same pass. The
//! graph ordering guarantees referenced resources were applied first;
//! failure to resolve is therefore an invariant violation surfaced as
//! [`ReconcileError::UnresolvedReference`].

use std::collections::BTreeMap;

use edgeship_provider::PropertyMap;

use crate::descriptor::{PropertyValue, ResourceDescriptor, ResourceId};

use super::types::ReconcileError;

/// Resolves descriptor properties against already-applied outputs.
pub struct ReferenceResolver<'a> {
  outputs: &'a BTreeMap<ResourceId, PropertyMap>,
}

impl<'a> ReferenceResolver<'a> {
  pub fn new(outputs: &'a BTreeMap<ResourceId, PropertyMap>) -> Self {
    Self { outputs }
  }

  /// Resolve every property of `descriptor` to a plain string value.
  pub fn resolve(&self, descriptor: &ResourceDescriptor) -> Result<PropertyMap, ReconcileError> {
    let mut resolved = PropertyMap::new();
    for (name, value) in &descriptor.properties {
      let resolved_value = match value {
        PropertyValue::Literal(literal) => literal.clone(),
        PropertyValue::Reference { resource, attribute } => {
          let outputs =
            self
              .outputs
              .get(resource)
              .ok_or_else(|| ReconcileError::UnresolvedReference {
                resource: descriptor.id.clone(),
                reference: resource.clone(),
                attribute: attribute.clone(),
              })?;
          outputs
            .get(attribute)
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownAttribute {
              resource: descriptor.id.clone(),
              reference: resource.clone(),
              attribute: attribute.clone(),
            })?
        }
      };
      resolved.insert(name.clone(), resolved_value);
    }
    Ok(resolved)
  }
}
