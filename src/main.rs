mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    if let Err(err) = run(&ctx, cli.command) {
        report(&ctx, &err);
        std::process::exit(1);
    }
}

fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Apply(args) => commands::apply::run(ctx, args),
        Command::Diff(args) => commands::diff::run(ctx, args),
        Command::Get(args) => commands::get::run(ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "marathon-sync", &mut io::stdout());
            Ok(())
        }
    }
}

/// Print an error and what to try next
fn report(ctx: &Context, err: &anyhow::Error) {
    ui::error(&format!("{err:#}"));
    if ctx.verbose > 1 {
        eprintln!("{err:?}");
    }

    let source = match err.downcast_ref::<marathon::ReconcileError>() {
        Some(failure) => {
            if failure.mutation == marathon::MutationState::Indeterminate {
                ui::warn("Check the app on the orchestrator before retrying");
            }
            Some(failure.error())
        }
        None => err.downcast_ref::<marathon::Error>(),
    };
    if let Some(source) = source {
        let category = source.category();
        log::debug!("Error category: {category}");
        if !ctx.quiet {
            eprintln!("  {}", category.advice());
        }
    }
}
