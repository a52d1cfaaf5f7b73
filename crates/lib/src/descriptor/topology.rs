//! The fixed site resource topology.
//!
//! edgeship targets exactly one resource shape: origin store → origin
//! access control → CDN distribution → store policy. The cross-references
//! here are what drive the dependency ordering; nothing else in the
//! system knows about the shape.

use crate::config::SiteConfig;

use super::{PropertyValue, ResourceDescriptor, ResourceId, ResourceKind};

pub fn store_id(site: &SiteConfig) -> ResourceId {
  ResourceId::new(site.name.clone())
}

pub fn access_control_id(site: &SiteConfig) -> ResourceId {
  ResourceId::new(format!("{}-oac", site.name))
}

pub fn distribution_id(site: &SiteConfig) -> ResourceId {
  ResourceId::new(format!("{}-dist", site.name))
}

pub fn policy_id(site: &SiteConfig) -> ResourceId {
  ResourceId::new(format!("{}-policy", site.name))
}

/// Build the descriptor set for a site.
///
/// - The distribution references the store's ARN (origin) and the access
///   control's provider-assigned id, so it must be applied after both.
/// - The policy references the store's name and the distribution's ARN
///   (the statement restricting origin reads to that distribution), so it
///   is applied last.
pub fn site_descriptors(site: &SiteConfig) -> Vec<ResourceDescriptor> {
  let store = store_id(site);
  let oac = access_control_id(site);
  let dist = distribution_id(site);
  let policy = policy_id(site);

  vec![
    ResourceDescriptor::new(store.clone(), ResourceKind::ObjectStore)
      .with("name", PropertyValue::literal(site.name.clone()))
      .with("region", PropertyValue::literal(site.region.clone())),
    ResourceDescriptor::new(oac.clone(), ResourceKind::OriginAccessControl)
      .with("name", PropertyValue::literal(oac.as_str()))
      .with("signing", PropertyValue::literal("always")),
    ResourceDescriptor::new(dist.clone(), ResourceKind::CdnDistribution)
      .with("origin_arn", PropertyValue::reference(store.clone(), "arn"))
      .with("origin_access_control", PropertyValue::reference(oac, "oac_id"))
      .with("default_root_object", PropertyValue::literal("index.html"))
      .with("error_page", PropertyValue::literal("error.html")),
    ResourceDescriptor::new(policy, ResourceKind::AccessPolicy)
      .with("store", PropertyValue::reference(store, "name"))
      .with("allowed_distribution", PropertyValue::reference(dist, "arn")),
  ]
}
