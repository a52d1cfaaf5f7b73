//! edgeship-lib: provisioning and publishing for a static-content edge.
//!
//! The library is organized leaf-first:
//! - [`descriptor`]: declarative resource descriptors and validation
//! - [`graph`]: dependency ordering over descriptors
//! - [`reconcile`]: converge remote resources to the declared state
//! - [`sync`]: converge origin store content with the local asset tree
//! - [`invalidate`]: purge changed paths from the edge cache
//! - [`deploy`]: the coordinator sequencing reconcile → sync → invalidate
//!
//! All remote interaction goes through the traits in `edgeship-provider`.

pub mod cancel;
pub mod config;
pub mod deploy;
pub mod descriptor;
pub mod graph;
pub mod invalidate;
pub mod reconcile;
pub mod retry;
pub mod sync;
pub mod util;

pub use cancel::CancelToken;
pub use config::{ConfigError, DeployConfig};
pub use deploy::{DeployStage, RunReport, RunStatus, deploy};
pub use descriptor::{DescriptorSet, PropertyValue, ResourceDescriptor, ResourceId};
pub use graph::{DependencyGraph, GraphError};
pub use invalidate::{InvalidateError, InvalidationOutcome};
pub use reconcile::{ReconcileError, ReconcileOutcome, reconcile};
pub use retry::RetryPolicy;
pub use sync::{PublishPlan, SyncError, SyncOutcome};
