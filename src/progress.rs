//! Progress indicators for marathon-sync.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use marathon::{Error, WaitCallback};
use std::sync::OnceLock;
use std::time::Duration;

/// Create a spinner with a message
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Drives a spinner from deployment poll results.
///
/// The spinner only appears once a poll reports pending deployments.
pub struct DeploymentSpinner {
    pb: OnceLock<ProgressBar>,
}

impl DeploymentSpinner {
    pub fn new() -> Self {
        Self { pb: OnceLock::new() }
    }

    fn started(&self) -> &ProgressBar {
        self.pb.get_or_init(|| spinner("Waiting for deployment..."))
    }
}

impl Default for DeploymentSpinner {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitCallback for DeploymentSpinner {
    fn on_poll(&self, attempt: u32, pending: &[String]) {
        if pending.is_empty() {
            if let Some(pb) = self.pb.get() {
                pb.finish_and_clear();
            }
        } else {
            self.started().set_message(format!(
                "Waiting for deployment ({} pending, poll {attempt})...",
                pending.len()
            ));
        }
    }

    fn on_transient_error(&self, attempt: u32, error: &Error) {
        let line = format!("  {} poll {attempt} failed: {error}", "⚠".yellow());
        match self.pb.get() {
            Some(pb) => pb.suspend(|| eprintln!("{line}")),
            None => eprintln!("{line}"),
        }
    }
}

impl Drop for DeploymentSpinner {
    fn drop(&mut self) {
        if let Some(pb) = self.pb.get()
            && !pb.is_finished()
        {
            pb.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_spinner_starts_on_pending_poll() {
        let spinner = DeploymentSpinner::new();
        assert!(spinner.pb.get().is_none());

        spinner.on_poll(1, &[]);
        assert!(spinner.pb.get().is_none());

        spinner.on_poll(2, &["d-1".to_string()]);
        assert!(spinner.pb.get().is_some());

        spinner.on_poll(3, &[]);
        assert!(spinner.pb.get().is_some_and(ProgressBar::is_finished));
    }
}
