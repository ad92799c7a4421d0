//! Deployment waiter.
//!
//! After a mutation the orchestrator rolls the change out asynchronously.
//! [`DeploymentWaiter`] polls the outstanding deployments until none of them
//! touches the application, bounded by a wall-clock timeout.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{AppId, DeploymentHandle, WaitConfig};
use std::thread;
use std::time::Instant;

/// Callback trait for wait progress notifications.
pub trait WaitCallback {
    /// Called after every successful poll.
    ///
    /// # Arguments
    /// * `attempt` - Poll number (1-indexed)
    /// * `pending` - Ids of deployments still touching the application
    fn on_poll(&self, attempt: u32, pending: &[String]);

    /// Called when a poll failed with a transient error.
    fn on_transient_error(&self, attempt: u32, error: &Error);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl WaitCallback for NoCallback {
    fn on_poll(&self, _attempt: u32, _pending: &[String]) {}
    fn on_transient_error(&self, _attempt: u32, _error: &Error) {}
}

/// Polls outstanding deployments for one application.
pub struct DeploymentWaiter<'a> {
    backend: &'a dyn Backend,
    config: WaitConfig,
    callback: Option<&'a dyn WaitCallback>,
}

impl<'a> DeploymentWaiter<'a> {
    pub fn new(backend: &'a dyn Backend, config: WaitConfig) -> Self {
        Self {
            backend,
            config,
            callback: None,
        }
    }

    #[must_use]
    pub fn with_callback(mut self, callback: &'a dyn WaitCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Block until no outstanding deployment affects `app_id`.
    ///
    /// A deployment is outstanding for the application when its affected
    /// apps include `app_id` or its id is one of `handles`. The first poll
    /// happens immediately; later polls are `poll_interval` apart.
    ///
    /// Transport failures and 5xx responses are retried until the timeout.
    /// Any other error is returned at once.
    ///
    /// # Errors
    /// [`Error::DeploymentTimedOut`] once the timeout elapses with
    /// deployments still pending.
    pub fn await_completion(&self, app_id: &AppId, handles: &[DeploymentHandle]) -> Result<()> {
        let start = Instant::now();
        let mut attempt: u32 = 0;
        let mut pending: Vec<String> = Vec::new();
        let mut last_error: Option<String> = None;

        log::debug!(
            "Waiting for {} deployment(s) of {app_id} (timeout {}s)",
            handles.len(),
            self.config.timeout.as_secs()
        );

        loop {
            if attempt > 0 {
                let elapsed = start.elapsed();
                if elapsed >= self.config.timeout {
                    return Err(Error::DeploymentTimedOut {
                        app_id: app_id.to_string(),
                        elapsed,
                        pending,
                        last_error,
                    });
                }
                thread::sleep(self.config.poll_interval);
            }
            attempt += 1;

            match self.backend.list_deployments() {
                Ok(deployments) => {
                    pending = deployments
                        .into_iter()
                        .filter(|d| {
                            d.affects(app_id) || handles.iter().any(|h| h.as_str() == d.id)
                        })
                        .map(|d| d.id)
                        .collect();
                    last_error = None;

                    if let Some(cb) = self.callback {
                        cb.on_poll(attempt, &pending);
                    }
                    if pending.is_empty() {
                        log::debug!("Deployments of {app_id} finished after {attempt} poll(s)");
                        return Ok(());
                    }
                    log::trace!("Poll {attempt}: pending {}", pending.join(", "));
                }
                Err(e) if e.is_retryable() => {
                    log::warn!("Polling deployments of {app_id} failed (attempt {attempt}): {e}");
                    if let Some(cb) = self.callback {
                        cb.on_transient_error(attempt, &e);
                    }
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Wait for deployments with an optional callback.
pub fn await_completion(
    backend: &dyn Backend,
    app_id: &AppId,
    handles: &[DeploymentHandle],
    config: &WaitConfig,
    callback: Option<&dyn WaitCallback>,
) -> Result<()> {
    let mut waiter = DeploymentWaiter::new(backend, *config);
    if let Some(cb) = callback {
        waiter = waiter.with_callback(cb);
    }
    waiter.await_completion(app_id, handles)
}
