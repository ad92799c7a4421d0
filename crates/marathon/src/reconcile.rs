//! The reconciler: fetch, decide, mutate, wait.

use crate::backend::Backend;
use crate::backend::http::HttpBackend;
use crate::error::{Error, ReconcileError, Result};
use crate::source::DefinitionSource;
use crate::types::{AppDefinition, AppId, ClusterConfig, Plan, ReconcileOutcome, WaitConfig};
use crate::wait::{DeploymentWaiter, WaitCallback};
use declarative::{Decision, DiffOptions, RequestedState, decide_with};

/// Converges one application on one cluster to a requested state.
///
/// Each reconciler owns its backend and settings, so reconcilers for
/// different clusters can live side by side.
///
/// # Example
///
/// ```no_run
/// use marathon::{ClusterConfig, DefinitionSource, Reconciler, RequestedState};
///
/// let reconciler = Reconciler::new(ClusterConfig::new("http://marathon:8080"));
/// let source = DefinitionSource::Inline(r#"{"id": "nginx", "instances": 2}"#.to_string());
///
/// let outcome = reconciler.reconcile(&source, RequestedState::Present).unwrap();
/// println!("changed: {}", outcome.changed);
/// ```
pub struct Reconciler {
    backend: Box<dyn Backend>,
    wait: WaitConfig,
    force: bool,
    diff_options: DiffOptions,
    callback: Option<Box<dyn WaitCallback>>,
}

impl Reconciler {
    /// Create a reconciler talking to a cluster over HTTP.
    #[must_use]
    pub fn new(cluster: ClusterConfig) -> Self {
        Self::with_backend(Box::new(HttpBackend::new(cluster)))
    }

    /// Create a reconciler with a custom backend (useful for testing).
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            wait: WaitConfig::default(),
            force: false,
            diff_options: crate::diff_options(),
            callback: None,
        }
    }

    #[must_use]
    pub fn wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// Send `force=true` with updates and deletes.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Replace the fields left out of the comparison.
    #[must_use]
    pub fn diff_options(mut self, options: DiffOptions) -> Self {
        self.diff_options = options;
        self
    }

    /// Receive deployment progress while waiting.
    #[must_use]
    pub fn callback(mut self, callback: Box<dyn WaitCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Load the desired definition and converge the cluster to it.
    ///
    /// A bare id source is only accepted for [`RequestedState::Absent`].
    ///
    /// # Errors
    /// Every failure reports whether a mutation had already been issued.
    pub fn reconcile(
        &self,
        source: &DefinitionSource,
        requested: RequestedState,
    ) -> std::result::Result<ReconcileOutcome, ReconcileError> {
        let desired = load_for(source, requested).map_err(ReconcileError::before_mutation)?;
        self.reconcile_definition(&desired, requested)
    }

    /// Converge the cluster to an already loaded definition.
    pub fn reconcile_definition(
        &self,
        desired: &AppDefinition,
        requested: RequestedState,
    ) -> std::result::Result<ReconcileOutcome, ReconcileError> {
        let id = desired.id();
        let current = self
            .backend
            .get_app(id)
            .map_err(ReconcileError::before_mutation)?;
        let decision = self.decide(desired, current.as_ref(), requested);

        log::info!("{id}: {decision}");
        for change in decision.changes() {
            log::debug!("  {change}");
        }

        let response = match &decision {
            Decision::NoOp => {
                return Ok(ReconcileOutcome {
                    app_id: id.clone(),
                    changed: false,
                    decision,
                    final_state: current,
                    deployments: Vec::new(),
                });
            }
            Decision::Create => self.backend.create_app(desired),
            Decision::Update { .. } => self.backend.update_app(id, desired, self.force),
            Decision::Delete => self.backend.delete_app(id, self.force),
        }
        .map_err(ReconcileError::during_mutation)?;

        let mut waiter = DeploymentWaiter::new(self.backend.as_ref(), self.wait);
        if let Some(cb) = &self.callback {
            waiter = waiter.with_callback(cb.as_ref());
        }
        waiter
            .await_completion(id, &response.deployments)
            .map_err(ReconcileError::after_mutation)?;

        let final_state = match decision {
            Decision::Delete => None,
            _ => self
                .backend
                .get_app(id)
                .map_err(ReconcileError::after_mutation)?,
        };

        Ok(ReconcileOutcome {
            app_id: id.clone(),
            changed: true,
            decision,
            final_state,
            deployments: response.deployments,
        })
    }

    // =========================================================================
    // Read-only Operations
    // =========================================================================

    /// Fetch and decide without mutating anything.
    pub fn plan(&self, source: &DefinitionSource, requested: RequestedState) -> Result<Plan> {
        let desired = load_for(source, requested)?;
        let current = self.backend.get_app(desired.id())?;
        let decision = self.decide(&desired, current.as_ref(), requested);
        Ok(Plan {
            decision,
            desired,
            current,
        })
    }

    /// Fetch the running definition of an application.
    ///
    /// # Errors
    /// [`Error::AppNotFound`] if the application does not exist.
    pub fn get(&self, id: &AppId) -> Result<AppDefinition> {
        self.backend
            .get_app(id)?
            .ok_or_else(|| Error::AppNotFound {
                app_id: id.to_string(),
            })
    }

    fn decide(
        &self,
        desired: &AppDefinition,
        current: Option<&AppDefinition>,
        requested: RequestedState,
    ) -> Decision {
        decide_with(
            desired.as_map(),
            current.map(AppDefinition::as_map),
            requested,
            &self.diff_options,
        )
    }
}

fn load_for(source: &DefinitionSource, requested: RequestedState) -> Result<AppDefinition> {
    if requested == RequestedState::Present && !source.has_definition() {
        return Err(Error::invalid_definition(
            source.origin(),
            "a full definition is required for state \"present\"",
        ));
    }
    source.load()
}
