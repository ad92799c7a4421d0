//! Marathon REST backend.
//!
//! Implements [`Backend`] against the Marathon v2 API:
//!
//! | Operation          | Request                         |
//! |--------------------|---------------------------------|
//! | fetch              | `GET /v2/apps/{id}`             |
//! | create             | `POST /v2/apps`                 |
//! | update             | `PUT /v2/apps/{id}[?force=true]`    |
//! | delete             | `DELETE /v2/apps/{id}[?force=true]` |
//! | list deployments   | `GET /v2/deployments`           |
//!
//! HTTP error statuses are returned as data rather than transport errors, so
//! every failure carries the status and the orchestrator's message.

use crate::backend::Backend;
use crate::error::{Error, Operation, Result};
use crate::types::{
    AppDefinition, AppId, ClusterConfig, Credentials, Deployment, DeploymentHandle,
    MutationResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

/// Longest slice of a non-JSON error body kept in error messages.
const MAX_DETAIL_LEN: usize = 200;

/// Backend talking to a Marathon cluster over HTTP.
///
/// # Example
///
/// ```no_run
/// use marathon::backend::Backend;
/// use marathon::backend::http::HttpBackend;
/// use marathon::{AppId, ClusterConfig};
///
/// let backend = HttpBackend::new(ClusterConfig::new("http://marathon.example.com:8080"));
/// let app = backend.get_app(&AppId::parse("/nginx").unwrap()).unwrap();
/// println!("exists: {}", app.is_some());
/// ```
pub struct HttpBackend {
    agent: ureq::Agent,
    cluster: ClusterConfig,
    authorization: Option<String>,
}

/// Status and body of a completed request.
struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn json(&self, operation: Operation, target: &str) -> Result<Value> {
        serde_json::from_str(&self.body).map_err(|e| {
            Error::unreachable(
                operation,
                target,
                Some(self.status),
                format!("unexpected response body: {e}"),
            )
        })
    }

    /// Turn a non-2xx reply into an error carrying the orchestrator's message.
    fn into_error(self, operation: Operation, target: &str) -> Error {
        let detail = error_detail(&self.body);
        Error::unreachable(operation, target, Some(self.status), detail)
    }
}

impl HttpBackend {
    /// Create a backend for the given cluster.
    #[must_use]
    pub fn new(cluster: ClusterConfig) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(cluster.request_timeout))
            .build();
        let authorization = cluster.credentials.as_ref().map(authorization_header);

        Self {
            agent: ureq::Agent::new_with_config(config),
            cluster,
            authorization,
        }
    }

    /// The cluster this backend talks to.
    #[must_use]
    pub fn cluster(&self) -> &ClusterConfig {
        &self.cluster
    }

    fn app_url(&self, id: &AppId) -> String {
        self.cluster.endpoint(&format!("apps/{}", id.path()))
    }

    fn prepare<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request.header("Accept", "application/json");
        match &self.authorization {
            Some(value) => request.header("Authorization", value),
            None => request,
        }
    }

    fn finish(
        result: std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
        operation: Operation,
        target: &str,
    ) -> Result<Reply> {
        let mut response = result.map_err(|e| transport_error(e, operation, target))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| transport_error(e, operation, target))?;
        log::debug!("{operation} {target}: HTTP {status}");
        Ok(Reply { status, body })
    }

    fn mutation_response(
        reply: Reply,
        operation: Operation,
        target: &str,
    ) -> Result<MutationResponse> {
        if !reply.is_success() {
            return Err(reply.into_error(operation, target));
        }
        if reply.body.trim().is_empty() {
            return Ok(MutationResponse::default());
        }
        match reply.json(operation, target) {
            Ok(body) => Ok(MutationResponse {
                deployments: deployment_handles(&body),
                definition: Some(body),
            }),
            Err(err) => {
                log::warn!("{operation} {target} succeeded with an unreadable response: {err}");
                Ok(MutationResponse::default())
            }
        }
    }
}

impl Backend for HttpBackend {
    fn get_app(&self, id: &AppId) -> Result<Option<AppDefinition>> {
        let url = self.app_url(id);
        log::debug!("GET {url}");
        let reply = Self::finish(
            self.prepare(self.agent.get(&url)).call(),
            Operation::Fetch,
            id.as_str(),
        )?;

        if reply.status == 404 {
            return Ok(None);
        }
        if !reply.is_success() {
            return Err(reply.into_error(Operation::Fetch, id.as_str()));
        }

        let mut body = reply.json(Operation::Fetch, id.as_str())?;
        let app = body.get_mut("app").map(Value::take).ok_or_else(|| {
            Error::unreachable(
                Operation::Fetch,
                id.as_str(),
                Some(reply.status),
                "response has no \"app\" field",
            )
        })?;
        AppDefinition::from_value(app, &url).map(Some)
    }

    fn create_app(&self, app: &AppDefinition) -> Result<MutationResponse> {
        let url = self.cluster.endpoint("apps");
        let target = app.id().as_str();
        log::debug!("POST {url}");
        let reply = Self::finish(
            self.prepare(self.agent.post(&url)).send_json(app.as_map()),
            Operation::Create,
            target,
        )?;
        Self::mutation_response(reply, Operation::Create, target)
    }

    fn update_app(
        &self,
        id: &AppId,
        app: &AppDefinition,
        force: bool,
    ) -> Result<MutationResponse> {
        let url = self.app_url(id);
        log::debug!("PUT {url} (force: {force})");
        let mut request = self.prepare(self.agent.put(&url));
        if force {
            request = request.query("force", "true");
        }
        let reply = Self::finish(
            request.send_json(app.as_map()),
            Operation::Update,
            id.as_str(),
        )?;
        Self::mutation_response(reply, Operation::Update, id.as_str())
    }

    fn delete_app(&self, id: &AppId, force: bool) -> Result<MutationResponse> {
        let url = self.app_url(id);
        log::debug!("DELETE {url} (force: {force})");
        let mut request = self.prepare(self.agent.delete(&url));
        if force {
            request = request.query("force", "true");
        }
        let reply = Self::finish(request.call(), Operation::Delete, id.as_str())?;
        Self::mutation_response(reply, Operation::Delete, id.as_str())
    }

    fn list_deployments(&self) -> Result<Vec<Deployment>> {
        let url = self.cluster.endpoint("deployments");
        let reply = Self::finish(
            self.prepare(self.agent.get(&url)).call(),
            Operation::ListDeployments,
            "deployments",
        )?;
        if !reply.is_success() {
            return Err(reply.into_error(Operation::ListDeployments, "deployments"));
        }

        let body = reply.json(Operation::ListDeployments, "deployments")?;
        serde_json::from_value(body).map_err(|e| {
            Error::unreachable(
                Operation::ListDeployments,
                "deployments",
                Some(reply.status),
                format!("unexpected deployment list: {e}"),
            )
        })
    }
}

fn authorization_header(credentials: &Credentials) -> String {
    match credentials {
        Credentials::Basic { username, password } => {
            format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
        }
        Credentials::Token(token) => format!("token={token}"),
    }
}

fn transport_error(err: ureq::Error, operation: Operation, target: &str) -> Error {
    match err {
        ureq::Error::StatusCode(code) => {
            Error::unreachable(operation, target, Some(code), "request failed")
        }
        other => Error::unreachable(operation, target, None, other.to_string()),
    }
}

/// Extract the orchestrator's error message from a response body.
///
/// Marathon answers errors with `{"message": "..."}`, sometimes with a
/// `details` array; anything else is truncated as plain text.
fn error_detail(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body)
        && let Some(message) = map.get("message").and_then(Value::as_str)
    {
        return match map.get("details") {
            Some(details) if !details.is_null() => format!("{message} {details}"),
            _ => message.to_string(),
        };
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response".to_string();
    }
    match trimmed.char_indices().nth(MAX_DETAIL_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Deployment ids from a mutation response.
///
/// Create answers with the stored app and its `deployments`; update and
/// delete answer with a single `deploymentId`.
fn deployment_handles(body: &Value) -> Vec<DeploymentHandle> {
    if let Some(id) = body.get("deploymentId").and_then(Value::as_str) {
        return vec![DeploymentHandle::new(id)];
    }
    body.get("deployments")
        .and_then(Value::as_array)
        .map(|deployments| {
            deployments
                .iter()
                .filter_map(|d| d.get("id").and_then(Value::as_str))
                .map(DeploymentHandle::new)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::time::Duration;

    fn backend(server: &Server) -> HttpBackend {
        HttpBackend::new(
            ClusterConfig::new(server.url()).with_request_timeout(Duration::from_secs(5)),
        )
    }

    fn nginx() -> AppDefinition {
        AppDefinition::from_value(json!({"id": "nginx", "instances": 2}), "inline").unwrap()
    }

    fn id(raw: &str) -> AppId {
        AppId::parse(raw).unwrap()
    }

    #[test]
    fn test_get_app_found() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/v2/apps/web/nginx")
            .with_status(200)
            .with_body(r#"{"app": {"id": "/web/nginx", "instances": 1, "version": "v1"}}"#)
            .create();

        let app = backend(&server).get_app(&id("/web/nginx")).unwrap().unwrap();
        assert_eq!(app.id().as_str(), "/web/nginx");
        assert_eq!(app.get("instances"), Some(&json!(1)));
        mock.assert();
    }

    #[test]
    fn test_get_app_missing() {
        let mut server = Server::new();
        server
            .mock("GET", "/v2/apps/nginx")
            .with_status(404)
            .with_body(r#"{"message": "App '/nginx' does not exist"}"#)
            .create();

        assert!(backend(&server).get_app(&id("nginx")).unwrap().is_none());
    }

    #[test]
    fn test_get_app_server_error() {
        let mut server = Server::new();
        server
            .mock("GET", "/v2/apps/nginx")
            .with_status(503)
            .with_body("Service Unavailable")
            .create();

        let err = backend(&server).get_app(&id("nginx")).unwrap_err();
        match err {
            Error::OrchestratorUnreachable {
                operation,
                status,
                detail,
                ..
            } => {
                assert_eq!(operation, Operation::Fetch);
                assert_eq!(status, Some(503));
                assert_eq!(detail, "Service Unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_create_app_returns_deployments() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/v2/apps")
            .match_body(Matcher::Json(json!({"id": "nginx", "instances": 2})))
            .with_status(201)
            .with_body(
                r#"{"id": "/nginx", "instances": 2, "deployments": [{"id": "5ed4c0c5"}]}"#,
            )
            .create();

        let response = backend(&server).create_app(&nginx()).unwrap();
        assert_eq!(response.deployments, vec![DeploymentHandle::new("5ed4c0c5")]);
        assert!(response.definition.is_some());
        mock.assert();
    }

    #[test]
    fn test_mutation_with_unreadable_body_succeeds() {
        let mut server = Server::new();
        server
            .mock("POST", "/v2/apps")
            .with_status(201)
            .with_body("<html>created</html>")
            .create();

        let response = backend(&server).create_app(&nginx()).unwrap();
        assert_eq!(response, MutationResponse::default());
    }

    #[test]
    fn test_mutation_gateway_error_keeps_status() {
        let mut server = Server::new();
        server.mock("POST", "/v2/apps").with_status(502).create();

        let err = backend(&server).create_app(&nginx()).unwrap_err();
        assert!(matches!(
            err,
            Error::OrchestratorUnreachable {
                status: Some(502),
                ..
            }
        ));
    }

    #[test]
    fn test_update_app_with_force() {
        let mut server = Server::new();
        let mock = server
            .mock("PUT", "/v2/apps/nginx")
            .match_query(Matcher::UrlEncoded("force".into(), "true".into()))
            .match_body(Matcher::Json(json!({"id": "nginx", "instances": 2})))
            .with_status(200)
            .with_body(r#"{"deploymentId": "83b215a6", "version": "2024-01-15T00:00:00.000Z"}"#)
            .create();

        let response = backend(&server)
            .update_app(&id("nginx"), &nginx(), true)
            .unwrap();
        assert_eq!(response.deployments, vec![DeploymentHandle::new("83b215a6")]);
        mock.assert();
    }

    #[test]
    fn test_update_app_locked() {
        let mut server = Server::new();
        server
            .mock("PUT", "/v2/apps/nginx")
            .with_status(409)
            .with_body(r#"{"message": "App is locked by one or more deployments."}"#)
            .create();

        let err = backend(&server)
            .update_app(&id("nginx"), &nginx(), false)
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn test_delete_app() {
        let mut server = Server::new();
        let mock = server
            .mock("DELETE", "/v2/apps/nginx")
            .with_status(200)
            .with_body(r#"{"deploymentId": "a1b2", "version": "v2"}"#)
            .create();

        let response = backend(&server).delete_app(&id("nginx"), false).unwrap();
        assert_eq!(response.deployments, vec![DeploymentHandle::new("a1b2")]);
        mock.assert();
    }

    #[test]
    fn test_list_deployments() {
        let mut server = Server::new();
        server
            .mock("GET", "/v2/deployments")
            .with_status(200)
            .with_body(
                r#"[{"id": "a1b2", "affectedApps": ["/nginx"], "currentStep": 1, "totalSteps": 2}]"#,
            )
            .create();

        let deployments = backend(&server).list_deployments().unwrap();
        assert_eq!(deployments.len(), 1);
        assert!(deployments[0].affects(&id("nginx")));
    }

    #[test]
    fn test_basic_auth_header() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/v2/deployments")
            .match_header("authorization", "Basic b3BzOmh1bnRlcjI=")
            .with_status(200)
            .with_body("[]")
            .create();

        let backend = HttpBackend::new(ClusterConfig::new(server.url()).with_credentials(
            Credentials::Basic {
                username: "ops".to_string(),
                password: "hunter2".to_string(),
            },
        ));
        assert!(backend.list_deployments().unwrap().is_empty());
        mock.assert();
    }

    #[test]
    fn test_connection_refused_has_no_status() {
        let backend = HttpBackend::new(
            ClusterConfig::new("http://127.0.0.1:1").with_request_timeout(Duration::from_secs(2)),
        );
        let err = backend.list_deployments().unwrap_err();
        assert!(matches!(
            err,
            Error::OrchestratorUnreachable { status: None, .. }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_detail() {
        assert_eq!(error_detail(r#"{"message": "Object is not valid"}"#), "Object is not valid");
        assert_eq!(error_detail(""), "empty response");
        let long = "x".repeat(500);
        assert!(error_detail(&long).ends_with("..."));
    }

    #[test]
    fn test_deployment_handles() {
        assert!(deployment_handles(&json!({"id": "/nginx"})).is_empty());
        assert_eq!(
            deployment_handles(&json!({"deployments": [{"id": "a"}, {"id": "b"}]})).len(),
            2
        );
    }
}
