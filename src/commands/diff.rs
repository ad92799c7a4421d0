//! `marathon-sync diff`: preview what apply would change.
//!
//! Both documents are pretty-printed with sorted keys and compared as text.
//! The comparison covers the whole stored definition, so fields the
//! orchestrator fills in show up as removals even when apply would leave the
//! app alone; the decision line above the diff is what apply acts on.

use anyhow::Result;
use colored::Colorize;
use declarative::RequestedState;
use marathon::Reconciler;
use serde_json::{Map, Value};
use similar::{ChangeTag, TextDiff};

use crate::Context;
use crate::cli::{DiffArgs, DiffStyle};
use crate::config::{self, Config};
use crate::ui;

pub fn run(ctx: &Context, args: DiffArgs) -> Result<()> {
    let requested: RequestedState = args.state.into();
    let source = super::definition_source(&args.source, requested)?;
    let config = Config::load()?;
    let settings = config::resolve(&config, &args.cluster, None, None)?;

    let plan = Reconciler::new(settings.cluster).plan(&source, requested)?;

    let old = plan
        .current
        .as_ref()
        .map_or_else(|| render(&Value::Object(Map::new())), |app| render(&app.to_value()));
    let new = match requested {
        RequestedState::Present => render(&plan.desired.to_value()),
        RequestedState::Absent => render(&Value::Object(Map::new())),
    };

    if !ctx.quiet {
        ui::header(&format!("{}: {}", plan.desired.id(), plan.decision));
        for change in plan.decision.changes() {
            ui::dim(&change.to_string());
        }
        println!();
    }

    let lines = diff_lines(&old, &new, args.style);
    if lines.is_empty() {
        ui::info("No differences");
        return Ok(());
    }
    for line in &lines {
        println!("{}", colorize(line));
    }
    Ok(())
}

/// Pretty-print with keys sorted at every level
fn render(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(&sorted(value)).unwrap_or_default();
    text.push('\n');
    text
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Text diff lines in the requested style
///
/// `Full` is a unified diff with headers and context; `Compact` keeps only
/// the changed lines.
fn diff_lines(old: &str, new: &str, style: DiffStyle) -> Vec<String> {
    if old == new {
        return Vec::new();
    }
    let diff = TextDiff::from_lines(old, new);

    match style {
        DiffStyle::Full => diff
            .unified_diff()
            .context_radius(3)
            .header("current", "desired")
            .to_string()
            .lines()
            .map(str::to_string)
            .collect(),
        DiffStyle::Compact => diff
            .iter_all_changes()
            .filter_map(|change| {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => return None,
                };
                Some(format!("{sign}{}", change.value().trim_end_matches('\n')))
            })
            .collect(),
    }
}

fn colorize(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold().to_string()
    } else if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with("@@") {
        line.cyan().to_string()
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_sorts_keys() {
        let text = render(&json!({"mem": 64, "cpus": 0.5, "id": "/nginx"}));
        let cpus = text.find("cpus").unwrap();
        let id = text.find("\"id\"").unwrap();
        let mem = text.find("mem").unwrap();
        assert!(cpus < id && id < mem);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_render_sorts_nested_keys() {
        let text = render(&json!({"container": {"type": "DOCKER", "docker": {}}}));
        assert!(text.find("docker").unwrap() < text.find("type").unwrap());
    }

    #[test]
    fn test_identical_documents_have_no_diff() {
        let text = render(&json!({"id": "/nginx"}));
        assert!(diff_lines(&text, &text, DiffStyle::Full).is_empty());
        assert!(diff_lines(&text, &text, DiffStyle::Compact).is_empty());
    }

    #[test]
    fn test_compact_diff_only_changed_lines() {
        let old = render(&json!({"id": "/nginx", "instances": 1, "mem": 64}));
        let new = render(&json!({"id": "/nginx", "instances": 2, "mem": 64}));

        let lines = diff_lines(&old, &new, DiffStyle::Compact);
        assert_eq!(lines, vec!["-  \"instances\": 1,", "+  \"instances\": 2,"]);
    }

    #[test]
    fn test_full_diff_has_headers_and_context() {
        let old = render(&json!({"id": "/nginx", "instances": 1}));
        let new = render(&json!({"id": "/nginx", "instances": 2}));

        let lines = diff_lines(&old, &new, DiffStyle::Full);
        assert_eq!(lines[0], "--- current");
        assert_eq!(lines[1], "+++ desired");
        assert!(lines.iter().any(|l| l.starts_with("@@")));
        assert!(lines.iter().any(|l| l == "   \"id\": \"/nginx\","));
        assert!(lines.iter().any(|l| l == "+  \"instances\": 2"));
    }

    #[test]
    fn test_diff_against_missing_app() {
        let old = render(&json!({}));
        let new = render(&json!({"id": "/nginx"}));

        let lines = diff_lines(&old, &new, DiffStyle::Compact);
        assert!(lines.contains(&"+  \"id\": \"/nginx\"".to_string()));
    }
}
