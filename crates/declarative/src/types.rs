//! Core types for declarative document reconciliation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// State the caller wants the document to be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedState {
    /// Document should exist and match the desired definition
    Present,
    /// Document should not exist
    Absent,
}

impl RequestedState {
    /// Lowercase name used in CLI flags and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }
}

impl fmt::Display for RequestedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step in a path through a document tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    /// Object member
    Key(String),
    /// Array element
    Index(usize),
}

/// Location of a field inside a document, e.g. `container.docker.image`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    /// The empty path (document root)
    pub fn root() -> Self {
        Self::default()
    }

    /// Enter an object member
    pub fn push_key(&mut self, key: &str) {
        self.0.push(Segment::Key(key.to_string()));
    }

    /// Enter an array element
    pub fn push_index(&mut self, index: usize) {
        self.0.push(Segment::Index(index));
    }

    /// Leave the innermost segment
    pub fn pop(&mut self) {
        self.0.pop();
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Top-level field this path starts at
    pub fn top_level(&self) -> Option<&str> {
        match self.0.first() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// A field whose desired value differs from the current one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Where the difference is
    pub path: FieldPath,
    /// Value the caller asked for
    pub desired: Value,
    /// Value currently stored, `None` when the field is missing
    pub current: Option<Value>,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.current {
            Some(current) => write!(f, "{}: {} -> {}", self.path, current, self.desired),
            None => write!(f, "{}: (unset) -> {}", self.path, self.desired),
        }
    }
}

/// Operation needed to converge current state to the requested state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Decision {
    /// Already converged
    NoOp,
    /// Document is missing and must be created
    Create,
    /// Document exists but differs in the listed fields
    Update { changes: Vec<FieldChange> },
    /// Document exists and must be removed
    Delete,
}

impl Decision {
    /// Whether applying this decision changes anything
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoOp)
    }

    /// Fields that differ (empty unless this is an update)
    pub fn changes(&self) -> &[FieldChange] {
        match self {
            Self::Update { changes } => changes,
            _ => &[],
        }
    }

    /// Short verb for logs and summaries
    pub fn verb(&self) -> &'static str {
        match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Update { .. } => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update { changes } => write!(f, "update ({} fields)", changes.len()),
            other => f.write_str(other.verb()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_path_display() {
        let mut path = FieldPath::root();
        assert_eq!(path.to_string(), "<root>");

        path.push_key("container");
        path.push_key("portMappings");
        path.push_index(0);
        path.push_key("servicePort");
        assert_eq!(path.to_string(), "container.portMappings[0].servicePort");
        assert_eq!(path.top_level(), Some("container"));

        path.pop();
        path.pop();
        assert_eq!(path.to_string(), "container.portMappings");
    }

    #[test]
    fn test_decision_helpers() {
        assert!(!Decision::NoOp.is_change());
        assert!(Decision::Create.is_change());
        assert!(Decision::Delete.changes().is_empty());

        let mut path = FieldPath::root();
        path.push_key("instances");
        let update = Decision::Update {
            changes: vec![FieldChange {
                path,
                desired: json!(2),
                current: Some(json!(1)),
            }],
        };
        assert_eq!(update.changes().len(), 1);
        assert_eq!(update.to_string(), "update (1 fields)");
        assert_eq!(update.changes()[0].to_string(), "instances: 1 -> 2");
    }

    #[test]
    fn test_decision_serializes_with_action_tag() {
        let value = serde_json::to_value(Decision::Create).unwrap();
        assert_eq!(value, json!({"action": "create"}));
    }

    #[test]
    fn test_requested_state_serde() {
        let state: RequestedState = serde_json::from_value(json!("absent")).unwrap();
        assert_eq!(state, RequestedState::Absent);
        assert_eq!(RequestedState::Present.to_string(), "present");
    }
}
