//! Error types for reconciliation.
//!
//! Errors are categorized so the deployment waiter can tell transient
//! orchestrator hiccups from failures that will not heal, and so the caller
//! can report whether anything was already changed on the cluster.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Orchestrator API call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// `GET /apps/{id}`
    Fetch,
    /// `POST /apps`
    Create,
    /// `PUT /apps/{id}`
    Update,
    /// `DELETE /apps/{id}`
    Delete,
    /// `GET /deployments`
    ListDeployments,
}

impl Operation {
    /// Whether this call changes state on the orchestrator.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetch => "fetch",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ListDeployments => "list deployments",
        };
        f.write_str(name)
    }
}

/// Categories of errors for retry logic and user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Input definition is malformed or unreadable.
    Definition,
    /// Connection failure or server-side (5xx) error; transient.
    Network,
    /// Orchestrator answered with a client error status (4xx).
    Rejected,
    /// Deployment did not finish in time.
    Timeout,
    /// Requested application does not exist.
    NotFound,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Definition => "Invalid application definition",
            Self::Network => "Orchestrator unreachable",
            Self::Rejected => "Request rejected by orchestrator",
            Self::Timeout => "Deployment timed out",
            Self::NotFound => "Application not found",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Definition => "Check that the definition is a JSON object with a string \"id\"",
            Self::Network => "Check the orchestrator URI and that the cluster is reachable",
            Self::Rejected => {
                "Check credentials and the definition; use --force if a deployment holds a lock"
            }
            Self::Timeout => {
                "Inspect the deployment on the orchestrator (e.g. insufficient cluster resources)"
            }
            Self::NotFound => "Verify the application id",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while reconciling an application.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The desired definition could not be read or parsed.
    #[error("invalid application definition from {origin}: {message}")]
    InvalidDefinition {
        /// Where the definition came from (file path or "inline").
        origin: String,
        /// What is wrong with it.
        message: String,
    },

    /// An orchestrator call failed at the transport or HTTP level.
    #[error("{operation} {target} failed{}: {detail}", status_suffix(.status))]
    OrchestratorUnreachable {
        /// Call that failed.
        operation: Operation,
        /// Application id or endpoint addressed.
        target: String,
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Response body or transport error message.
        detail: String,
    },

    /// Outstanding deployments did not clear within the timeout.
    #[error(
        "deployment of {app_id} still in progress after {}s (pending: {})",
        .elapsed.as_secs(),
        pending_list(.pending)
    )]
    DeploymentTimedOut {
        /// Application being deployed.
        app_id: String,
        /// Time spent waiting.
        elapsed: Duration,
        /// Deployment ids still outstanding at the last successful poll.
        pending: Vec<String>,
        /// Last transient poll error, if the final polls failed.
        last_error: Option<String>,
    },

    /// The application does not exist on the orchestrator.
    #[error("application {app_id} not found")]
    AppNotFound {
        /// Application id that was looked up.
        app_id: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

fn pending_list(pending: &[String]) -> String {
    if pending.is_empty() {
        "unknown".to_string()
    } else {
        pending.join(", ")
    }
}

impl Error {
    /// Create an `InvalidDefinition` error.
    pub fn invalid_definition(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Create an `OrchestratorUnreachable` error.
    pub fn unreachable(
        operation: Operation,
        target: impl Into<String>,
        status: Option<u16>,
        detail: impl Into<String>,
    ) -> Self {
        Self::OrchestratorUnreachable {
            operation,
            target: target.into(),
            status,
            detail: detail.into(),
        }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidDefinition { .. } => ErrorCategory::Definition,
            Self::OrchestratorUnreachable { status, .. } => match status {
                Some(code) if (400..500).contains(code) => ErrorCategory::Rejected,
                _ => ErrorCategory::Network,
            },
            Self::DeploymentTimedOut { .. } => ErrorCategory::Timeout,
            Self::AppNotFound { .. } => ErrorCategory::NotFound,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Stable machine-readable name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDefinition { .. } => "invalid_definition",
            Self::OrchestratorUnreachable { .. } => "orchestrator_unreachable",
            Self::DeploymentTimedOut { .. } => "deployment_timed_out",
            Self::AppNotFound { .. } => "app_not_found",
        }
    }
}

/// Whether a failed run already changed something on the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    /// Failed before any mutation, or the orchestrator rejected it.
    NotIssued,
    /// The mutating request got no answer or a server error.
    Indeterminate,
    /// The mutation succeeded; a later step failed.
    Applied,
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotIssued => "no change was made to the orchestrator",
            Self::Indeterminate => "the orchestrator may or may not have applied the change",
            Self::Applied => "the change was applied to the orchestrator",
        };
        f.write_str(text)
    }
}

/// A failed reconciliation, with what had already happened on the cluster.
#[derive(Debug, thiserror::Error)]
#[error("reconciliation failed, {mutation}")]
pub struct ReconcileError {
    /// Mutation state at the time of failure.
    pub mutation: MutationState,
    /// The underlying error.
    #[source]
    pub source: Error,
}

impl ReconcileError {
    /// Failure before any mutating call.
    pub fn before_mutation(source: Error) -> Self {
        Self {
            mutation: MutationState::NotIssued,
            source,
        }
    }

    /// Failure of the mutating call itself.
    ///
    /// A 4xx status means the orchestrator refused the request. A 5xx status
    /// or a transport failure leaves the outcome unknown, and a 2xx status
    /// means the change went through.
    pub fn during_mutation(source: Error) -> Self {
        let mutation = match &source {
            Error::OrchestratorUnreachable {
                status: Some(status),
                ..
            } => match status {
                200..=299 => MutationState::Applied,
                400..=499 => MutationState::NotIssued,
                _ => MutationState::Indeterminate,
            },
            Error::OrchestratorUnreachable { status: None, .. } => MutationState::Indeterminate,
            _ => MutationState::NotIssued,
        };
        Self { mutation, source }
    }

    /// Failure after the mutation was accepted.
    pub fn after_mutation(source: Error) -> Self {
        Self {
            mutation: MutationState::Applied,
            source,
        }
    }

    /// The underlying error.
    #[must_use]
    pub fn error(&self) -> &Error {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::Rejected.is_retryable());
        assert!(!ErrorCategory::Definition.is_retryable());
        assert!(!ErrorCategory::Timeout.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
    }

    #[test]
    fn test_error_category_advice() {
        assert!(!ErrorCategory::Network.advice().is_empty());
        assert!(!ErrorCategory::Timeout.advice().is_empty());
        assert!(format!("{}", ErrorCategory::Timeout).contains("timed out"));
    }

    #[test]
    fn test_unreachable_category_by_status() {
        let transport = Error::unreachable(Operation::Fetch, "/nginx", None, "connection refused");
        assert_eq!(transport.category(), ErrorCategory::Network);
        assert!(transport.is_retryable());

        let server = Error::unreachable(Operation::ListDeployments, "deployments", Some(503), "");
        assert_eq!(server.category(), ErrorCategory::Network);

        let client = Error::unreachable(Operation::Update, "/nginx", Some(409), "locked");
        assert_eq!(client.category(), ErrorCategory::Rejected);
        assert!(!client.is_retryable());
    }

    #[test]
    fn test_unreachable_display_includes_status() {
        let err = Error::unreachable(Operation::Update, "/nginx", Some(409), "App is locked");
        let display = err.to_string();
        assert!(display.contains("update /nginx"));
        assert!(display.contains("HTTP 409"));
        assert!(display.contains("App is locked"));

        let err = Error::unreachable(Operation::Fetch, "/nginx", None, "connection refused");
        assert!(!err.to_string().contains("HTTP"));
    }

    #[test]
    fn test_timed_out_display() {
        let err = Error::DeploymentTimedOut {
            app_id: "/nginx".to_string(),
            elapsed: Duration::from_secs(180),
            pending: vec!["d-1".to_string()],
            last_error: None,
        };
        let display = err.to_string();
        assert!(display.contains("/nginx"));
        assert!(display.contains("180s"));
        assert!(display.contains("d-1"));
        assert_eq!(err.kind(), "deployment_timed_out");
    }

    #[test]
    fn test_operation_is_mutation() {
        assert!(Operation::Create.is_mutation());
        assert!(Operation::Delete.is_mutation());
        assert!(!Operation::Fetch.is_mutation());
        assert!(!Operation::ListDeployments.is_mutation());
    }

    #[test]
    fn test_mutation_state_for_failed_mutation() {
        let rejected = ReconcileError::during_mutation(Error::unreachable(
            Operation::Create,
            "/nginx",
            Some(422),
            "invalid",
        ));
        assert_eq!(rejected.mutation, MutationState::NotIssued);

        let lost = ReconcileError::during_mutation(Error::unreachable(
            Operation::Create,
            "/nginx",
            None,
            "connection reset",
        ));
        assert_eq!(lost.mutation, MutationState::Indeterminate);
    }

    #[test]
    fn test_mutation_state_by_status_class() {
        let during = |status| {
            ReconcileError::during_mutation(Error::unreachable(
                Operation::Update,
                "/nginx",
                Some(status),
                "",
            ))
            .mutation
        };
        assert_eq!(during(409), MutationState::NotIssued);
        assert_eq!(during(502), MutationState::Indeterminate);
        assert_eq!(during(504), MutationState::Indeterminate);
        assert_eq!(during(201), MutationState::Applied);
    }

    #[test]
    fn test_reconcile_error_display() {
        let err = ReconcileError::after_mutation(Error::DeploymentTimedOut {
            app_id: "/nginx".to_string(),
            elapsed: Duration::from_secs(1),
            pending: vec![],
            last_error: None,
        });
        assert!(err.to_string().contains("was applied"));
        assert_eq!(err.error().kind(), "deployment_timed_out");
    }
}
