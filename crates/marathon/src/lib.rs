//! # marathon
//!
//! Declarative reconciliation of Marathon application definitions.
//!
//! Given a desired application definition and whether it should exist, the
//! [`Reconciler`] fetches what is running, asks the differ what single
//! operation converges the two, issues it, and waits until the resulting
//! deployment has rolled out.
//!
//! ## Example
//!
//! ```
//! use marathon::backend::MockBackend;
//! use marathon::{DefinitionSource, Reconciler, RequestedState, WaitConfig};
//! use std::time::Duration;
//!
//! let mock = MockBackend::new();
//! let reconciler = Reconciler::with_backend(Box::new(mock.clone()))
//!     .wait_config(WaitConfig::new(Duration::from_secs(10), Duration::from_millis(10)));
//! let source = DefinitionSource::Inline(r#"{"id": "nginx", "instances": 2}"#.to_string());
//!
//! let outcome = reconciler.reconcile(&source, RequestedState::Present).unwrap();
//! assert!(outcome.changed);
//!
//! // Running again changes nothing.
//! let outcome = reconciler.reconcile(&source, RequestedState::Present).unwrap();
//! assert!(!outcome.changed);
//! ```
//!
//! ## Failure Reporting
//!
//! A failed run returns a [`ReconcileError`] whose [`MutationState`] says
//! whether the cluster was already changed:
//!
//! | State           | Meaning                                          |
//! |-----------------|--------------------------------------------------|
//! | `NotIssued`     | failed before mutating, or the mutation was refused |
//! | `Indeterminate` | the connection dropped during the mutation       |
//! | `Applied`       | the mutation succeeded; waiting or re-reading failed |

pub mod backend;
pub mod error;
pub mod reconcile;
pub mod source;
pub mod types;
pub mod wait;

pub use error::{Error, ErrorCategory, MutationState, Operation, ReconcileError, Result};
pub use reconcile::Reconciler;
pub use source::DefinitionSource;
pub use types::{
    AppDefinition, AppId, ClusterConfig, Credentials, DEFAULT_POLL_INTERVAL,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_TIMEOUT, Deployment, DeploymentHandle, MutationResponse,
    Plan, ReconcileOutcome, WaitConfig,
};
pub use wait::{DeploymentWaiter, NoCallback, WaitCallback, await_completion};

pub use declarative::{Decision, DiffOptions, FieldChange, RequestedState};

/// Comparison options for Marathon application definitions.
///
/// Leaves out the `id` (both documents were matched by id already) and the
/// service ports Marathon assigns to port mappings.
#[must_use]
pub fn diff_options() -> DiffOptions {
    DiffOptions::new()
        .ignore("id")
        .ignore("container.docker.portMappings.*.servicePort")
        .ignore("container.portMappings.*.servicePort")
}
