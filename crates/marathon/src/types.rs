//! Core types for Marathon reconciliation.
//!
//! Application definitions are kept as JSON documents rather than a fixed
//! struct: the orchestrator accepts far more fields than any one caller uses,
//! and the differ only compares what the caller declared.

use crate::error::{Error, Result};
use declarative::Decision;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Default time to wait for a deployment to finish.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Default delay between deployment polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application identifier.
///
/// Marathon ids are slash-separated paths; `nginx`, `/nginx` and `/nginx/`
/// all name the same application. The canonical form has one leading slash
/// and no trailing slash.
///
/// ```
/// use marathon::AppId;
///
/// let id = AppId::parse("web/nginx/").unwrap();
/// assert_eq!(id.to_string(), "/web/nginx");
/// assert_eq!(id.path(), "web/nginx");
/// assert_eq!(id, AppId::parse("/web/nginx").unwrap());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(String);

impl AppId {
    /// Parse and normalize an application id.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(Error::invalid_definition(
                "id",
                format!("application id {raw:?} is empty"),
            ));
        }
        if trimmed.split('/').any(str::is_empty) {
            return Err(Error::invalid_definition(
                "id",
                format!("application id {raw:?} contains an empty path segment"),
            ));
        }
        Ok(Self(format!("/{trimmed}")))
    }

    /// Id without the leading slash, for use in URL paths.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.0[1..]
    }

    /// Canonical id with a leading slash.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `raw` names this application.
    #[must_use]
    pub fn matches(&self, raw: &str) -> bool {
        raw.trim().trim_matches('/') == self.path()
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for AppId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// An application definition document.
///
/// Always a JSON object with a string `id`. The document is kept exactly as
/// supplied; it is sent to the orchestrator unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct AppDefinition {
    id: AppId,
    document: Map<String, Value>,
}

impl AppDefinition {
    /// Validate a parsed JSON value as an application definition.
    ///
    /// `origin` names where the value came from, for error messages.
    pub fn from_value(value: Value, origin: &str) -> Result<Self> {
        let Value::Object(document) = value else {
            return Err(Error::invalid_definition(
                origin,
                format!("expected a JSON object, found {}", kind_name(&value)),
            ));
        };

        let id = match document.get("id") {
            Some(Value::String(raw)) => AppId::parse(raw).map_err(|err| match err {
                Error::InvalidDefinition { message, .. } => {
                    Error::invalid_definition(origin, message)
                }
                other => other,
            })?,
            Some(other) => {
                return Err(Error::invalid_definition(
                    origin,
                    format!("\"id\" must be a string, found {}", kind_name(other)),
                ));
            }
            None => return Err(Error::invalid_definition(origin, "missing \"id\" field")),
        };

        Ok(Self { id, document })
    }

    /// Parse JSON text as an application definition.
    pub fn from_json(text: &str, origin: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::invalid_definition(origin, format!("malformed JSON: {e}")))?;
        Self::from_value(value, origin)
    }

    /// A minimal definition carrying only an id (used to delete by id).
    #[must_use]
    pub fn from_id(id: AppId) -> Self {
        let mut document = Map::new();
        document.insert("id".to_string(), Value::String(id.to_string()));
        Self { id, document }
    }

    #[must_use]
    pub fn id(&self) -> &AppId {
        &self.id
    }

    /// The definition as a JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Look up a top-level field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.document.get(field)
    }

    /// The definition as an owned JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.document.clone())
    }
}

impl Serialize for AppDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.document.serialize(serializer)
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Identifier of an in-flight rollout returned by a mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentHandle(String);

impl DeploymentHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An outstanding deployment as listed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Deployment id.
    pub id: String,
    /// Ids of the applications this deployment touches.
    #[serde(default)]
    pub affected_apps: Vec<String>,
    /// Step currently executing (1-indexed).
    #[serde(default)]
    pub current_step: Option<u32>,
    /// Total number of steps.
    #[serde(default)]
    pub total_steps: Option<u32>,
}

impl Deployment {
    /// Whether this deployment touches the given application.
    #[must_use]
    pub fn affects(&self, app_id: &AppId) -> bool {
        self.affected_apps.iter().any(|raw| app_id.matches(raw))
    }

    /// Progress as `step/total`, when the orchestrator reports it.
    #[must_use]
    pub fn progress(&self) -> Option<String> {
        match (self.current_step, self.total_steps) {
            (Some(current), Some(total)) => Some(format!("{current}/{total}")),
            _ => None,
        }
    }
}

/// Result of a create, update or delete call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationResponse {
    /// Deployments started by the call (possibly none).
    pub deployments: Vec<DeploymentHandle>,
    /// Stored definition, when the orchestrator echoes it back.
    pub definition: Option<Value>,
}

/// Credentials sent with every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP basic authentication.
    Basic { username: String, password: String },
    /// A pre-issued token, sent as `Authorization: token=<value>`.
    Token(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

/// Connection settings for one orchestrator cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Base URI, e.g. `http://marathon.example.com:8080`.
    pub uri: String,
    /// API path prefix appended to the base URI.
    pub api_prefix: String,
    /// Optional credentials.
    pub credentials: Option<Credentials>,
    /// Timeout for each HTTP request.
    pub request_timeout: Duration,
}

impl ClusterConfig {
    /// Cluster at `uri` with the v2 API, no credentials and default timeouts.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into().trim_end_matches('/').to_string(),
            api_prefix: "v2".to_string(),
            credentials: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    /// Build a full endpoint URL from a path relative to the API prefix.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.api_prefix.is_empty() {
            format!("{}/{}", self.uri, path)
        } else {
            format!("{}/{}/{}", self.uri, self.api_prefix, path)
        }
    }
}

/// How long and how often to poll for deployment completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Give up after this much wall-clock time.
    pub timeout: Duration,
    /// Delay between polls.
    pub poll_interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WaitConfig {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

/// Outcome of a successful reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    /// Application reconciled.
    pub app_id: AppId,
    /// Whether any mutation was issued.
    pub changed: bool,
    /// What the differ decided.
    pub decision: Decision,
    /// Definition stored on the orchestrator after the run (`None` if absent).
    pub final_state: Option<AppDefinition>,
    /// Deployments started by the mutation.
    pub deployments: Vec<DeploymentHandle>,
}

/// What a reconciliation would do, without doing it.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    /// Decision the differ reached.
    pub decision: Decision,
    /// Definition the caller supplied.
    pub desired: AppDefinition,
    /// Definition currently stored, if any.
    pub current: Option<AppDefinition>,
}
