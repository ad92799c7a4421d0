//! State differ: compares a desired document with the current one
//!
//! Comparison is restricted to the desired document's shape. Every object,
//! at any depth (including objects inside arrays), is compared only on the
//! members the desired side declares, so defaults the server adds to the
//! stored copy never show up as differences. Arrays are ordered and compared
//! element by element; a length mismatch reports the whole array.

use crate::types::{Decision, FieldChange, FieldPath, RequestedState, Segment};
use serde_json::{Map, Value};

/// A field path pattern to skip during comparison
///
/// Segments are separated by `.`; a `*` segment matches any object key or
/// array index, and a numeric segment matches that array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPattern {
    segments: Vec<String>,
}

impl FieldPattern {
    pub fn parse(pattern: &str) -> Self {
        Self {
            segments: pattern.split('.').map(str::to_string).collect(),
        }
    }

    /// Check if a concrete path matches this pattern
    pub fn matches(&self, path: &FieldPath) -> bool {
        let segments = path.segments();
        if segments.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(segments)
            .all(|(pattern, segment)| match segment {
                _ if pattern == "*" => true,
                Segment::Key(key) => pattern == key,
                Segment::Index(index) => pattern.parse::<usize>().is_ok_and(|i| i == *index),
            })
    }
}

/// Comparison options
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    ignored: Vec<FieldPattern>,
}

impl DiffOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip a field (and everything below it) during comparison
    pub fn ignore(mut self, pattern: &str) -> Self {
        self.ignored.push(FieldPattern::parse(pattern));
        self
    }

    pub fn is_ignored(&self, path: &FieldPath) -> bool {
        self.ignored.iter().any(|p| p.matches(path))
    }
}

/// Decide what is needed to bring `current` to `requested`
///
/// Uses default options (no ignored fields).
pub fn decide(
    desired: &Map<String, Value>,
    current: Option<&Map<String, Value>>,
    requested: RequestedState,
) -> Decision {
    decide_with(desired, current, requested, &DiffOptions::default())
}

/// Decide with explicit comparison options
pub fn decide_with(
    desired: &Map<String, Value>,
    current: Option<&Map<String, Value>>,
    requested: RequestedState,
    options: &DiffOptions,
) -> Decision {
    match (requested, current) {
        (RequestedState::Absent, Some(_)) => Decision::Delete,
        (RequestedState::Absent, None) => Decision::NoOp,
        (RequestedState::Present, None) => Decision::Create,
        (RequestedState::Present, Some(current)) => {
            let changes = diff_fields(desired, current, options);
            if changes.is_empty() {
                Decision::NoOp
            } else {
                Decision::Update { changes }
            }
        }
    }
}

/// List every field of `desired` that differs from `current`
///
/// Changes are returned in the desired document's field order.
pub fn diff_fields(
    desired: &Map<String, Value>,
    current: &Map<String, Value>,
    options: &DiffOptions,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let mut path = FieldPath::root();
    diff_object(&mut path, desired, current, options, &mut changes);
    changes
}

fn diff_object(
    path: &mut FieldPath,
    desired: &Map<String, Value>,
    current: &Map<String, Value>,
    options: &DiffOptions,
    out: &mut Vec<FieldChange>,
) {
    for (key, value) in desired {
        path.push_key(key);
        diff_value(path, value, current.get(key), options, out);
        path.pop();
    }
}

fn diff_value(
    path: &mut FieldPath,
    desired: &Value,
    current: Option<&Value>,
    options: &DiffOptions,
    out: &mut Vec<FieldChange>,
) {
    if options.is_ignored(path) {
        return;
    }

    match (desired, current) {
        (Value::Null, None | Some(Value::Null)) => {}
        (Value::Object(d), Some(Value::Object(c))) => diff_object(path, d, c, options, out),
        (Value::Array(d), Some(Value::Array(c))) if d.len() == c.len() => {
            for (index, (dv, cv)) in d.iter().zip(c).enumerate() {
                path.push_index(index);
                diff_value(path, dv, Some(cv), options, out);
                path.pop();
            }
        }
        (d, Some(c)) if leaf_equal(d, c) => {}
        (d, c) => out.push(FieldChange {
            path: path.clone(),
            desired: d.clone(),
            current: c.cloned(),
        }),
    }
}

/// Scalar equality; numbers compare by value so `1` equals `1.0`
fn leaf_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || matches!((x.as_f64(), y.as_f64()), (Some(fx), Some(fy)) if fx == fy)
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn paths(changes: &[FieldChange]) -> Vec<String> {
        changes.iter().map(|c| c.path.to_string()).collect()
    }

    #[test]
    fn test_absent_with_current_is_delete() {
        let desired = obj(json!({"id": "nginx"}));
        let current = obj(json!({"id": "/nginx", "instances": 1}));
        assert_eq!(
            decide(&desired, Some(&current), RequestedState::Absent),
            Decision::Delete
        );
    }

    #[test]
    fn test_absent_without_current_is_noop() {
        let desired = obj(json!({"id": "nginx"}));
        assert_eq!(decide(&desired, None, RequestedState::Absent), Decision::NoOp);
    }

    #[test]
    fn test_present_without_current_is_create() {
        let desired = obj(json!({"id": "nginx", "instances": 2}));
        assert_eq!(decide(&desired, None, RequestedState::Present), Decision::Create);
    }

    #[test]
    fn test_instances_change_is_update() {
        let desired = obj(json!({"id": "nginx", "instances": 2}));
        let current = obj(json!({"id": "nginx", "instances": 1}));

        let decision = decide(&desired, Some(&current), RequestedState::Present);
        match decision {
            Decision::Update { changes } => {
                assert_eq!(paths(&changes), vec!["instances"]);
                assert_eq!(changes[0].desired, json!(2));
                assert_eq!(changes[0].current, Some(json!(1)));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_extra_current_fields_are_ignored() {
        let desired = obj(json!({
            "id": "nginx",
            "instances": 2,
            "container": {"docker": {"image": "nginx:1.25"}}
        }));
        let current = obj(json!({
            "id": "nginx",
            "instances": 2,
            "version": "2024-01-15T00:00:00.000Z",
            "tasksRunning": 2,
            "container": {
                "type": "DOCKER",
                "docker": {"image": "nginx:1.25", "privileged": false}
            }
        }));

        assert_eq!(
            decide(&desired, Some(&current), RequestedState::Present),
            Decision::NoOp
        );
    }

    #[test]
    fn test_nested_difference_reports_leaf_path() {
        let desired = obj(json!({"container": {"docker": {"image": "nginx:1.26"}}}));
        let current = obj(json!({"container": {"docker": {"image": "nginx:1.25", "network": "BRIDGE"}}}));

        let changes = diff_fields(&desired, &current, &DiffOptions::default());
        assert_eq!(paths(&changes), vec!["container.docker.image"]);
    }

    #[test]
    fn test_missing_current_field_is_a_change() {
        let desired = obj(json!({"labels": {"team": "web"}}));
        let current = obj(json!({"labels": {}}));

        let changes = diff_fields(&desired, &current, &DiffOptions::default());
        assert_eq!(paths(&changes), vec!["labels.team"]);
        assert_eq!(changes[0].current, None);
    }

    #[test]
    fn test_arrays_are_ordered() {
        let desired = obj(json!({"args": ["-g", "daemon off;"]}));
        let current = obj(json!({"args": ["daemon off;", "-g"]}));

        let changes = diff_fields(&desired, &current, &DiffOptions::default());
        assert_eq!(paths(&changes), vec!["args[0]", "args[1]"]);
    }

    #[test]
    fn test_array_length_mismatch_reports_whole_array() {
        let desired = obj(json!({"constraints": [["hostname", "UNIQUE"]]}));
        let current = obj(json!({"constraints": []}));

        let changes = diff_fields(&desired, &current, &DiffOptions::default());
        assert_eq!(paths(&changes), vec!["constraints"]);
        assert_eq!(changes[0].current, Some(json!([])));
    }

    #[test]
    fn test_objects_inside_arrays_use_desired_shape() {
        let desired = obj(json!({
            "healthChecks": [{"protocol": "HTTP", "path": "/"}]
        }));
        let current = obj(json!({
            "healthChecks": [{"protocol": "HTTP", "path": "/", "gracePeriodSeconds": 300}]
        }));

        assert!(diff_fields(&desired, &current, &DiffOptions::default()).is_empty());
    }

    #[test]
    fn test_numbers_compare_by_value() {
        let desired = obj(json!({"cpus": 1, "mem": 128.0}));
        let current = obj(json!({"cpus": 1.0, "mem": 128}));
        assert!(diff_fields(&desired, &current, &DiffOptions::default()).is_empty());
    }

    #[test]
    fn test_kind_mismatch_is_a_change() {
        let desired = obj(json!({"instances": "2"}));
        let current = obj(json!({"instances": 2}));
        assert_eq!(
            paths(&diff_fields(&desired, &current, &DiffOptions::default())),
            vec!["instances"]
        );
    }

    #[test]
    fn test_desired_null_matches_missing() {
        let desired = obj(json!({"cmd": null}));
        let current = obj(json!({"id": "nginx"}));
        assert!(diff_fields(&desired, &current, &DiffOptions::default()).is_empty());

        let current = obj(json!({"cmd": "nginx"}));
        assert_eq!(
            paths(&diff_fields(&desired, &current, &DiffOptions::default())),
            vec!["cmd"]
        );
    }

    #[test]
    fn test_ignored_wildcard_paths() {
        let options = DiffOptions::new()
            .ignore("id")
            .ignore("container.docker.portMappings.*.servicePort");

        let desired = obj(json!({
            "id": "nginx",
            "container": {"docker": {"portMappings": [
                {"containerPort": 80, "servicePort": 0}
            ]}}
        }));
        let current = obj(json!({
            "id": "/nginx",
            "container": {"docker": {"portMappings": [
                {"containerPort": 80, "servicePort": 10001}
            ]}}
        }));

        assert!(diff_fields(&desired, &current, &options).is_empty());
        assert_eq!(
            paths(&diff_fields(&desired, &current, &DiffOptions::default())),
            vec!["id", "container.docker.portMappings[0].servicePort"]
        );
    }

    #[test]
    fn test_pattern_matching() {
        let mut path = FieldPath::root();
        path.push_key("portDefinitions");
        path.push_index(1);
        path.push_key("port");

        assert!(FieldPattern::parse("portDefinitions.*.port").matches(&path));
        assert!(FieldPattern::parse("portDefinitions.1.port").matches(&path));
        assert!(!FieldPattern::parse("portDefinitions.0.port").matches(&path));
        assert!(!FieldPattern::parse("portDefinitions").matches(&path));
    }

    #[test]
    fn test_changes_follow_desired_order() {
        let desired = obj(json!({"mem": 256, "cpus": 0.5, "instances": 3}));
        let current = obj(json!({"instances": 1, "cpus": 0.1, "mem": 128}));

        assert_eq!(
            paths(&diff_fields(&desired, &current, &DiffOptions::default())),
            vec!["mem", "cpus", "instances"]
        );
    }

    #[test]
    fn test_decide_is_deterministic() {
        let desired = obj(json!({"id": "nginx", "instances": 2, "env": {"A": "1"}}));
        let current = obj(json!({"id": "nginx", "instances": 1, "env": {"A": "2"}}));

        let first = decide(&desired, Some(&current), RequestedState::Present);
        let second = decide(&desired, Some(&current), RequestedState::Present);
        assert_eq!(first, second);
    }
}
