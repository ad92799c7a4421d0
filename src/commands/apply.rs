//! `marathon-sync apply`: converge an app and wait for the rollout.

use anyhow::Result;
use colored::Colorize;
use declarative::{Decision, RequestedState};
use marathon::{ReconcileError, ReconcileOutcome, Reconciler};
use serde_json::{Value, json};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::{self, Config};
use crate::progress::DeploymentSpinner;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let requested: RequestedState = args.state.into();
    let source = super::definition_source(&args.source, requested)?;
    let config = Config::load()?;
    let settings = config::resolve(&config, &args.cluster, args.timeout, args.poll_interval)?;

    log::debug!("Applying {source} with state {requested}");
    log::debug!("Orchestrator: {}", settings.cluster.uri);
    log::debug!(
        "Waiting up to {} (polling every {})",
        ui::format_duration(settings.wait.timeout),
        ui::format_duration(settings.wait.poll_interval)
    );

    let mut reconciler = Reconciler::new(settings.cluster)
        .wait_config(settings.wait)
        .force(args.force);
    if !args.json && !ctx.quiet {
        reconciler = reconciler.callback(Box::new(DeploymentSpinner::new()));
    }

    let result = reconciler.reconcile(&source, requested);
    // Clears the spinner before printing.
    drop(reconciler);

    match result {
        Ok(outcome) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&success_json(&outcome))?);
            } else if !ctx.quiet {
                print_outcome(&outcome, requested);
            }
            Ok(())
        }
        Err(err) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&failure_json(&err))?);
            }
            Err(err.into())
        }
    }
}

/// `{"changed": bool, "app": definition | null}`
fn success_json(outcome: &ReconcileOutcome) -> Value {
    json!({
        "changed": outcome.changed,
        "app": outcome.final_state,
    })
}

/// `{"failed": true, "kind": ..., "msg": ..., "mutation": ...}`
fn failure_json(err: &ReconcileError) -> Value {
    json!({
        "failed": true,
        "kind": err.error().kind(),
        "msg": err.error().to_string(),
        "mutation": err.mutation,
    })
}

fn print_outcome(outcome: &ReconcileOutcome, requested: RequestedState) {
    let id = &outcome.app_id;
    match &outcome.decision {
        Decision::NoOp if requested == RequestedState::Absent => {
            ui::success(&format!("{id} is already absent"));
        }
        Decision::NoOp => ui::success(&format!("{id} is up to date")),
        Decision::Create => ui::success(&format!("Created {id}")),
        Decision::Update { changes } => {
            ui::success(&format!(
                "Updated {id} ({} field{})",
                changes.len(),
                if changes.len() == 1 { "" } else { "s" }
            ));
            for change in changes {
                ui::dim(&change.to_string());
            }
        }
        Decision::Delete => ui::success(&format!("Deleted {id}")),
    }

    for deployment in &outcome.deployments {
        ui::dim(&format!("{} {}", "deployment".dimmed(), deployment));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marathon::backend::MockBackend;
    use marathon::{DefinitionSource, MutationState, WaitConfig};
    use std::time::Duration;

    fn reconciler(mock: &MockBackend) -> Reconciler {
        Reconciler::with_backend(Box::new(mock.clone())).wait_config(WaitConfig::new(
            Duration::from_millis(50),
            Duration::from_millis(5),
        ))
    }

    #[test]
    fn test_success_json_shape() {
        let mock = MockBackend::new();
        let outcome = reconciler(&mock)
            .reconcile(
                &DefinitionSource::Inline(r#"{"id": "nginx", "instances": 1}"#.to_string()),
                RequestedState::Present,
            )
            .unwrap();

        let value = success_json(&outcome);
        assert_eq!(value["changed"], json!(true));
        assert_eq!(value["app"]["id"], json!("/nginx"));
        assert_eq!(value["app"]["instances"], json!(1));
    }

    #[test]
    fn test_success_json_absent_app_is_null() {
        let mock = MockBackend::new();
        let outcome = reconciler(&mock)
            .reconcile(&DefinitionSource::Id("nginx".to_string()), RequestedState::Absent)
            .unwrap();

        let value = success_json(&outcome);
        assert_eq!(value, json!({"changed": false, "app": null}));
    }

    #[test]
    fn test_failure_json_shape() {
        let mock = MockBackend::new().with_settle_after(None);
        let err = reconciler(&mock)
            .reconcile(
                &DefinitionSource::Inline(r#"{"id": "nginx"}"#.to_string()),
                RequestedState::Present,
            )
            .unwrap_err();
        assert_eq!(err.mutation, MutationState::Applied);

        let value = failure_json(&err);
        assert_eq!(value["failed"], json!(true));
        assert_eq!(value["kind"], json!("deployment_timed_out"));
        assert_eq!(value["mutation"], json!("applied"));
        assert!(value["msg"].as_str().unwrap().contains("/nginx"));
    }
}
