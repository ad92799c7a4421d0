//! `marathon-sync get`: print a running app definition.

use anyhow::{Context as AnyhowContext, Result};
use marathon::{AppDefinition, AppId, Reconciler};
use serde_json::Value;

use crate::Context;
use crate::cli::GetArgs;
use crate::config::{self, Config};
use crate::ui;

/// Fields summarised above the full definition
const SUMMARY_FIELDS: &[(&str, &[&str])] = &[
    ("instances", &["instances"]),
    ("cpus", &["cpus"]),
    ("mem", &["mem"]),
    ("image", &["container", "docker", "image"]),
    ("version", &["version"]),
];

pub fn run(ctx: &Context, args: GetArgs) -> Result<()> {
    let id = AppId::parse(&args.app_id)?;
    let config = Config::load()?;
    let settings = config::resolve(&config, &args.cluster, None, None)?;

    let app = Reconciler::new(settings.cluster).get(&id)?;
    let pretty = serde_json::to_string_pretty(&app).context("Could not render definition")?;

    if args.json || ctx.quiet {
        println!("{pretty}");
        return Ok(());
    }

    ui::header(id.as_str());
    for (label, value) in summary(&app) {
        ui::kv(label, &value);
    }
    println!();
    println!("{pretty}");
    Ok(())
}

fn summary(app: &AppDefinition) -> Vec<(&'static str, String)> {
    SUMMARY_FIELDS
        .iter()
        .filter_map(|(label, path)| {
            let (first, rest) = path.split_first()?;
            let mut value = app.get(first)?;
            for key in rest {
                value = value.get(key)?;
            }
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((*label, text))
        })
        .collect()
}
