//! edgeship-provider: the cloud provider boundary for edgeship.
//!
//! This crate defines the traits the rest of edgeship talks to:
//! - [`ResourceProvider`]: the control plane (stores, policies,
//!   distributions, origin access controls as generic keyed resources)
//! - [`ObjectStore`]: the content plane (list/put/delete objects)
//! - [`EdgeCache`]: the edge plane (create and poll invalidations)
//!
//! Two implementations ship with the crate: [`MemoryProvider`], an
//! in-process double with fault injection for tests, and [`FsProvider`],
//! a filesystem-backed origin used by the CLI.

mod error;
mod fs;
mod memory;
mod traits;
mod types;

pub use error::ProviderError;
pub use fs::FsProvider;
pub use memory::MemoryProvider;
pub use traits::{EdgeCache, ObjectStore, ResourceProvider};
pub use types::{
  InvalidationStatus, ObjectMeta, PropertyMap, RemoteResource, ResourceKind,
};
