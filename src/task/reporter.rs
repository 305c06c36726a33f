//! Progress reporting for workflow runs
//!
//! The reporter is the observability collaborator of a run: it sees every task
//! boundary, every secondary error raised during compensation, and the success
//! marker. Reporting is fire-and-forget. A reporter must never fail a run, so
//! none of these methods return errors.

use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use tracing::{info, warn};

use super::Outcome;
use crate::Error;

/// Receives progress of a workflow run
#[cfg_attr(test, automock)]
pub trait ProgressReporter: Send + Sync {
    /// A task is about to run
    fn task_started(&self, workflow: &str, task: &str);

    /// A task finished with the given outcome
    fn task_finished(&self, workflow: &str, task: &str, outcome: Outcome, elapsed: Duration);

    /// An error was raised after the run's first error had already been recorded
    fn secondary_error(&self, workflow: &str, task: &str, error: &Error);

    /// The run reached its terminal task with no error recorded
    fn run_succeeded(&self, workflow: &str, message: &str);
}

/// Reporter that writes progress to `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn task_started(&self, workflow: &str, task: &str) {
        info!(workflow, task, "Starting task");
    }

    fn task_finished(&self, workflow: &str, task: &str, outcome: Outcome, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            Outcome::Success => info!(workflow, task, elapsed_ms, "Task completed"),
            Outcome::Failure => warn!(workflow, task, elapsed_ms, "Task failed"),
        }
    }

    fn secondary_error(&self, workflow: &str, task: &str, error: &Error) {
        warn!(workflow, task, error = %error, "Secondary error during cleanup");
    }

    fn run_succeeded(&self, workflow: &str, message: &str) {
        info!(workflow, "{}", message);
    }
}

/// Reporter that drops everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn task_started(&self, _workflow: &str, _task: &str) {}

    fn task_finished(&self, _workflow: &str, _task: &str, _outcome: Outcome, _elapsed: Duration) {}

    fn secondary_error(&self, _workflow: &str, _task: &str, _error: &Error) {}

    fn run_succeeded(&self, _workflow: &str, _message: &str) {}
}
