//! Backend trait and implementations for talking to the orchestrator.
//!
//! The reconciler only depends on [`Backend`]. [`http::HttpBackend`] talks
//! to a real Marathon over REST; [`MockBackend`] is an in-memory orchestrator
//! for testing without a cluster.
//!
//! # Testing
//!
//! ```
//! use marathon::backend::{Backend, MockBackend};
//! use marathon::{AppDefinition, AppId};
//! use serde_json::json;
//!
//! let mock = MockBackend::new();
//! let app = AppDefinition::from_value(json!({"id": "nginx", "instances": 1}), "inline").unwrap();
//! mock.create_app(&app).unwrap();
//!
//! let stored = mock.get_app(&AppId::parse("/nginx").unwrap()).unwrap();
//! assert!(stored.is_some());
//! ```

pub mod http;

use crate::error::{Error, Operation, Result};
use crate::types::{AppDefinition, AppId, Deployment, DeploymentHandle, MutationResponse};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Orchestrator operations the reconciler needs.
///
/// Implementations report a missing application as `Ok(None)` from
/// [`Backend::get_app`]; every other failure is an
/// [`Error::OrchestratorUnreachable`].
pub trait Backend: Send + Sync {
    /// Fetch the stored definition of an application.
    fn get_app(&self, id: &AppId) -> Result<Option<AppDefinition>>;

    /// Create an application from a definition.
    fn create_app(&self, app: &AppDefinition) -> Result<MutationResponse>;

    /// Replace the definition of an existing application.
    ///
    /// `force` overrides a lock held by a running deployment.
    fn update_app(&self, id: &AppId, app: &AppDefinition, force: bool)
    -> Result<MutationResponse>;

    /// Destroy an application.
    fn delete_app(&self, id: &AppId, force: bool) -> Result<MutationResponse>;

    /// List deployments that have not finished yet.
    fn list_deployments(&self) -> Result<Vec<Deployment>>;
}

/// A call received by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetApp(String),
    CreateApp(Value),
    UpdateApp {
        id: String,
        body: Value,
        force: bool,
    },
    DeleteApp {
        id: String,
        force: bool,
    },
    ListDeployments,
}

impl Call {
    /// Whether this call changes orchestrator state.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateApp(_) | Self::UpdateApp { .. } | Self::DeleteApp { .. }
        )
    }
}

#[derive(Debug)]
struct MockDeployment {
    deployment: Deployment,
    /// Polls left before the deployment disappears; `None` never finishes.
    remaining_polls: Option<u32>,
}

#[derive(Debug)]
struct MockState {
    apps: BTreeMap<AppId, Map<String, Value>>,
    deployments: Vec<MockDeployment>,
    calls: Vec<Call>,
    settle_after: Option<u32>,
    poll_failures: u32,
    failures: HashMap<Operation, (Option<u16>, String)>,
    next_id: u32,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            apps: BTreeMap::new(),
            deployments: Vec::new(),
            calls: Vec::new(),
            settle_after: Some(1),
            poll_failures: 0,
            failures: HashMap::new(),
            next_id: 1,
        }
    }
}

/// In-memory orchestrator for testing without a cluster.
///
/// Behaves like Marathon where the reconciler can observe it:
/// - stored definitions are enriched with server-side fields (`version`,
///   `tasksRunning`, assigned `servicePort`s), so the differ must ignore them
/// - every mutation starts a deployment that stays outstanding for a
///   configurable number of polls
/// - every call is recorded and can be inspected with [`MockBackend::calls`]
///
/// Clones share state, so a test can hand one clone to a reconciler and
/// inspect another.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create an empty mock whose deployments finish after one poll.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of polls a new deployment stays outstanding (`None`: forever).
    #[must_use]
    pub fn with_settle_after(self, polls: Option<u32>) -> Self {
        self.state().settle_after = polls;
        self
    }

    /// Store an application directly, without recording a call or starting
    /// a deployment. The document is stored exactly as given.
    pub fn insert_app(&self, document: Value) {
        if let Value::Object(map) = document
            && let Some(Ok(id)) = map.get("id").and_then(Value::as_str).map(AppId::parse)
        {
            self.state().apps.insert(id, map);
        }
    }

    /// Add an outstanding deployment that is not tied to any mutation.
    pub fn insert_deployment(&self, deployment: Deployment, remaining_polls: Option<u32>) {
        self.state().deployments.push(MockDeployment {
            deployment,
            remaining_polls,
        });
    }

    /// Fail the next `count` deployment listings with a transport error.
    pub fn fail_polls(&self, count: u32) {
        self.state().poll_failures = count;
    }

    /// Make every call of `operation` fail.
    ///
    /// With a status the failure looks like an HTTP error response; without
    /// one it looks like a dropped connection.
    pub fn fail_operation(&self, operation: Operation, status: Option<u16>, detail: &str) {
        self.state()
            .failures
            .insert(operation, (status, detail.to_string()));
    }

    /// Stored definition of an application, including server-side fields.
    #[must_use]
    pub fn stored(&self, id: &str) -> Option<Value> {
        let id = AppId::parse(id).ok()?;
        self.state().apps.get(&id).cloned().map(Value::Object)
    }

    /// All calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Calls that changed state.
    #[must_use]
    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    fn check_failure(state: &MockState, operation: Operation, target: &str) -> Result<()> {
        match state.failures.get(&operation) {
            Some((status, detail)) => Err(Error::unreachable(operation, target, *status, detail)),
            None => Ok(()),
        }
    }

    fn start_deployment(state: &mut MockState, id: &AppId) -> DeploymentHandle {
        let handle = DeploymentHandle::new(format!("deployment-{}", state.next_id));
        state.next_id += 1;
        state.deployments.push(MockDeployment {
            deployment: Deployment {
                id: handle.to_string(),
                affected_apps: vec![id.to_string()],
                current_step: Some(1),
                total_steps: Some(1),
            },
            remaining_polls: state.settle_after,
        });
        handle
    }

    /// Apply the defaults Marathon adds to every stored definition.
    fn enrich(state: &mut MockState, id: &AppId, app: &AppDefinition) -> Map<String, Value> {
        let mut stored = app.as_map().clone();
        stored.insert("id".to_string(), Value::String(id.to_string()));
        stored.insert(
            "version".to_string(),
            Value::String(format!("2024-01-15T00:00:{:02}.000Z", state.next_id % 60)),
        );
        stored.insert("tasksRunning".to_string(), Value::from(0));

        let mappings = stored
            .get_mut("container")
            .and_then(|c| c.get_mut("docker"))
            .and_then(|d| d.get_mut("portMappings"))
            .and_then(Value::as_array_mut);
        if let Some(mappings) = mappings {
            for (index, mapping) in mappings.iter_mut().enumerate() {
                if let Some(mapping) = mapping.as_object_mut() {
                    let assigned = mapping
                        .get("servicePort")
                        .and_then(Value::as_u64)
                        .is_some_and(|port| port != 0);
                    if !assigned {
                        mapping.insert("servicePort".to_string(), Value::from(10000 + index));
                    }
                }
            }
        }
        stored
    }
}

impl Backend for MockBackend {
    fn get_app(&self, id: &AppId) -> Result<Option<AppDefinition>> {
        let mut state = self.state();
        state.calls.push(Call::GetApp(id.to_string()));
        Self::check_failure(&state, Operation::Fetch, id.as_str())?;

        state
            .apps
            .get(id)
            .cloned()
            .map(|doc| AppDefinition::from_value(Value::Object(doc), "mock orchestrator"))
            .transpose()
    }

    fn create_app(&self, app: &AppDefinition) -> Result<MutationResponse> {
        let mut state = self.state();
        state.calls.push(Call::CreateApp(app.to_value()));
        Self::check_failure(&state, Operation::Create, app.id().as_str())?;

        if state.apps.contains_key(app.id()) {
            return Err(Error::unreachable(
                Operation::Create,
                app.id().as_str(),
                Some(409),
                format!("An app with id [{}] already exists.", app.id()),
            ));
        }

        let stored = Self::enrich(&mut state, app.id(), app);
        state.apps.insert(app.id().clone(), stored.clone());
        let handle = Self::start_deployment(&mut state, app.id());
        Ok(MutationResponse {
            deployments: vec![handle],
            definition: Some(Value::Object(stored)),
        })
    }

    fn update_app(
        &self,
        id: &AppId,
        app: &AppDefinition,
        force: bool,
    ) -> Result<MutationResponse> {
        let mut state = self.state();
        state.calls.push(Call::UpdateApp {
            id: id.to_string(),
            body: app.to_value(),
            force,
        });
        Self::check_failure(&state, Operation::Update, id.as_str())?;

        let locked = state
            .deployments
            .iter()
            .any(|d| d.remaining_polls != Some(0) && d.deployment.affects(id));
        if locked && !force {
            return Err(Error::unreachable(
                Operation::Update,
                id.as_str(),
                Some(409),
                format!("App is locked by one or more deployments: {id}"),
            ));
        }

        let stored = Self::enrich(&mut state, id, app);
        state.apps.insert(id.clone(), stored);
        let handle = Self::start_deployment(&mut state, id);
        Ok(MutationResponse {
            deployments: vec![handle],
            definition: None,
        })
    }

    fn delete_app(&self, id: &AppId, force: bool) -> Result<MutationResponse> {
        let mut state = self.state();
        state.calls.push(Call::DeleteApp {
            id: id.to_string(),
            force,
        });
        Self::check_failure(&state, Operation::Delete, id.as_str())?;

        if state.apps.remove(id).is_none() {
            return Err(Error::unreachable(
                Operation::Delete,
                id.as_str(),
                Some(404),
                format!("App '{id}' does not exist"),
            ));
        }
        let handle = Self::start_deployment(&mut state, id);
        Ok(MutationResponse {
            deployments: vec![handle],
            definition: None,
        })
    }

    fn list_deployments(&self) -> Result<Vec<Deployment>> {
        let mut state = self.state();
        state.calls.push(Call::ListDeployments);
        Self::check_failure(&state, Operation::ListDeployments, "deployments")?;

        if state.poll_failures > 0 {
            state.poll_failures -= 1;
            return Err(Error::unreachable(
                Operation::ListDeployments,
                "deployments",
                None,
                "connection refused",
            ));
        }

        state.deployments.retain(|d| d.remaining_polls != Some(0));
        let mut outstanding = Vec::with_capacity(state.deployments.len());
        for entry in &mut state.deployments {
            outstanding.push(entry.deployment.clone());
            if let Some(remaining) = entry.remaining_polls.as_mut() {
                *remaining -= 1;
            }
        }
        Ok(outstanding)
    }
}
