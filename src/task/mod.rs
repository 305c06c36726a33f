//! Workflow task engine
//!
//! A workflow is a closed enumeration of tasks plus a transition table: each
//! task names the task that follows it on success and the one that begins
//! compensation on failure. [`TaskRunner`] interprets that graph. It never
//! looks at task names or branches on which workflow it is running.
//!
//! # Run semantics
//!
//! - Tasks run strictly one at a time, in the order the graph dictates.
//! - A failing task records its error in the [`ExecutionContext`]; only the
//!   first recorded error is reported, later ones become secondary errors.
//! - Once an error is recorded, only cleanup tasks may run. A graph edge that
//!   leads from a failure into a forward task is refused and the run stops.
//! - A run succeeds only when it ends on a task that completes the run with no
//!   error recorded. Running out of tasks anywhere else is [`Error::Incomplete`].
//! - Forward tasks race the run's cancellation token and its deadline. Cleanup
//!   tasks ignore both, so compensation still happens after an interruption, but
//!   all of a run's cleanup shares one bounded grace window.

mod context;
mod reporter;

use std::fmt;
use std::future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{Error, Result};

pub use context::{Collaborators, ErrorLog, ExecutionContext, SecondaryError};
pub use reporter::{NoopReporter, ProgressReporter, TracingReporter};

#[cfg(test)]
pub use reporter::MockProgressReporter;

/// Result of running one task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The task's action succeeded
    Success,
    /// The task's action failed and its error was recorded
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure => write!(f, "failure"),
        }
    }
}

/// A step of a workflow
///
/// Implemented by fieldless enums. Tasks carry no per-run state; everything a
/// run mutates lives in the [`ExecutionContext`].
#[async_trait]
pub trait Task: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Workflow name used in logs and progress reports
    const WORKFLOW: &'static str;

    /// First task of the workflow
    const INITIAL: Self;

    /// Every task, in success-path order
    const ALL: &'static [Self];

    /// Marker reported when the run succeeds
    const SUCCESS_MESSAGE: &'static str;

    /// Task name for observability
    fn name(self) -> &'static str;

    /// Transition table: the task that follows this one given its outcome
    fn next(self, outcome: Outcome) -> Option<Self>;

    /// Whether this task may run after an error has been recorded
    fn is_cleanup(self) -> bool {
        false
    }

    /// Whether ending the run on this task without an error means success
    fn completes_run(self) -> bool;

    /// Perform the task's action against the context
    async fn run(self, ctx: &mut ExecutionContext) -> Result<()>;
}

/// Runs a task graph to completion
///
/// The runner holds no per-run state. Cancellation comes from the context's
/// token, so one runner can drive any number of runs back to back.
#[derive(Clone, Debug, Default)]
pub struct TaskRunner {
    timeout: Option<Duration>,
    cleanup_grace: Option<Duration>,
}

impl TaskRunner {
    /// Create a runner with no deadline and unbounded cleanup
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the forward part of a run by `timeout`, measured from the start of `run`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bound all cleanup of a run by `grace`, measured from the first cleanup task
    pub fn with_cleanup_grace(mut self, grace: Option<Duration>) -> Self {
        self.cleanup_grace = grace;
        self
    }

    /// Cleanup grace window
    pub fn cleanup_grace(&self) -> Option<Duration> {
        self.cleanup_grace
    }

    /// Run the graph starting at `initial`
    ///
    /// Returns the run's first recorded error, `Error::Incomplete` when the graph
    /// ran out of tasks outside a terminal task, or `Ok(())` on success.
    pub async fn run<T: Task>(&self, initial: T, ctx: &mut ExecutionContext) -> Result<()> {
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut current = Some(initial);
        let mut last = initial;

        while let Some(task) = current {
            if ctx.has_error() && !task.is_cleanup() {
                error!(
                    workflow = T::WORKFLOW,
                    task = task.name(),
                    "Refusing to run a non-cleanup task after a recorded error"
                );
                break;
            }

            ctx.visit(task.name());
            ctx.reporter().task_started(T::WORKFLOW, task.name());
            let started = Instant::now();

            let result = if task.is_cleanup() {
                let bound = ctx.cleanup_deadline(self.cleanup_grace);
                race(task, ctx, None, bound).await
            } else {
                let cancel = ctx.cancellation_token();
                race(task, ctx, Some(cancel), deadline).await
            };

            let outcome = match result {
                Ok(()) => Outcome::Success,
                Err(err) => {
                    ctx.set_error(task.name(), err);
                    Outcome::Failure
                }
            };
            ctx.reporter()
                .task_finished(T::WORKFLOW, task.name(), outcome, started.elapsed());

            last = task;
            current = task.next(outcome);
            debug!(
                workflow = T::WORKFLOW,
                task = task.name(),
                %outcome,
                next = current.map(|t| t.name()).unwrap_or("<end>"),
                "Transition"
            );
        }

        if let Some(err) = ctx.original_error() {
            return Err(err.clone());
        }

        if !last.completes_run() {
            error!(
                workflow = T::WORKFLOW,
                task = last.name(),
                "Workflow ended outside its terminal task"
            );
            return Err(Error::Incomplete(last.name().to_string()));
        }

        info!(workflow = T::WORKFLOW, "{}", T::SUCCESS_MESSAGE);
        ctx.reporter().run_succeeded(T::WORKFLOW, T::SUCCESS_MESSAGE);
        Ok(())
    }
}

/// Run `task`, losing to `cancel` or `deadline` if either fires first
async fn race<T: Task>(
    task: T,
    ctx: &mut ExecutionContext,
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
) -> Result<()> {
    let cancelled = async move {
        match cancel {
            Some(token) => token.cancelled().await,
            None => future::pending::<()>().await,
        }
    };
    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancelled => Err(Error::Cancelled(task.name().to_string())),
        _ = expired => Err(Error::DeadlineExceeded(task.name().to_string())),
        result = task.run(ctx) => result,
    }
}

/// One row of a workflow's transition table
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// Task name
    pub from: &'static str,
    /// Next task on success, `None` when the run ends
    pub on_success: Option<&'static str>,
    /// Next task on failure, `None` when the run ends
    pub on_failure: Option<&'static str>,
    /// Whether the task may run after an error
    pub cleanup: bool,
    /// Whether ending here without an error is success
    pub terminal: bool,
}

/// Transition table of workflow `T`, in success-path order
pub fn describe<T: Task>() -> Vec<Transition> {
    T::ALL
        .iter()
        .map(|&task| Transition {
            from: task.name(),
            on_success: task.next(Outcome::Success).map(|t| t.name()),
            on_failure: task.next(Outcome::Failure).map(|t| t.name()),
            cleanup: task.is_cleanup(),
            terminal: task.completes_run(),
        })
        .collect()
}
