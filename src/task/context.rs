//! Per-run execution state
//!
//! One [`ExecutionContext`] exists per workflow run. The runner owns it for the
//! length of the run and lends it to each task in turn, so a task only ever
//! observes mutations made by tasks that ran strictly before it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::reporter::{ProgressReporter, TracingReporter};
use crate::interfaces::{AddonManager, Bootstrapper, ClusterManager, FileWriter, Provider};
use crate::types::{Cluster, ClusterSpec, DatacenterConfig, MachineConfig};
use crate::{Error, Result};

/// Collaborator handles, fixed for the whole run
#[derive(Clone)]
pub struct Collaborators {
    /// Bootstrap cluster lifecycle
    pub bootstrapper: Arc<dyn Bootstrapper>,
    /// Infrastructure provider
    pub provider: Arc<dyn Provider>,
    /// Cluster API operations
    pub cluster_manager: Arc<dyn ClusterManager>,
    /// GitOps add-ons
    pub addon_manager: Arc<dyn AddonManager>,
    /// Artifact persistence
    pub writer: Arc<dyn FileWriter>,
}

/// An error raised after the run's first error was already recorded
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecondaryError {
    /// Task (or out-of-graph action) that raised it
    pub task: &'static str,
    /// The error itself
    pub error: Error,
}

/// First-error-wins error record
///
/// The first error ever recorded becomes the run's reported error and is never
/// replaced. Everything after it lands in `secondary`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorLog {
    primary: Option<(&'static str, Error)>,
    secondary: Vec<SecondaryError>,
}

impl ErrorLog {
    /// Record an error; returns true when it became the primary error
    pub fn record(&mut self, task: &'static str, error: Error) -> bool {
        if self.primary.is_none() {
            self.primary = Some((task, error));
            true
        } else {
            self.secondary.push(SecondaryError { task, error });
            false
        }
    }

    /// The run's reported error
    pub fn primary(&self) -> Option<&Error> {
        self.primary.as_ref().map(|(_, error)| error)
    }

    /// Task that raised the run's reported error
    pub fn primary_task(&self) -> Option<&'static str> {
        self.primary.as_ref().map(|(task, _)| *task)
    }

    /// Errors recorded after the primary one, in order
    pub fn secondary(&self) -> &[SecondaryError] {
        &self.secondary
    }

    /// Whether any error was recorded
    pub fn is_empty(&self) -> bool {
        self.primary.is_none()
    }
}

/// State threaded through every task of a run
pub struct ExecutionContext {
    workflow: &'static str,
    spec: ClusterSpec,
    collaborators: Collaborators,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
    force_cleanup: bool,
    cleanup_deadline: Option<Instant>,
    errors: ErrorLog,
    visited: Vec<&'static str>,
    /// Bootstrap cluster, set once it has been created
    pub bootstrap_cluster: Option<Cluster>,
    /// Workload cluster, set once it exists
    pub workload_cluster: Option<Cluster>,
    /// Datacenter configuration captured with reconcile paused
    pub datacenter_config: Option<DatacenterConfig>,
    /// Machine configurations captured alongside `datacenter_config`
    pub machine_configs: Vec<MachineConfig>,
}

impl ExecutionContext {
    /// Create a fresh context for one run of `workflow`
    pub fn new(workflow: &'static str, spec: ClusterSpec, collaborators: Collaborators) -> Self {
        Self {
            workflow,
            spec,
            collaborators,
            reporter: Arc::new(TracingReporter),
            cancel: CancellationToken::new(),
            force_cleanup: false,
            cleanup_deadline: None,
            errors: ErrorLog::default(),
            visited: Vec::new(),
            bootstrap_cluster: None,
            workload_cluster: None,
            datacenter_config: None,
            machine_configs: Vec::new(),
        }
    }

    /// Replace the progress reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Cancel this run through an externally owned token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Delete any leftover bootstrap cluster before the first task
    pub fn with_force_cleanup(mut self, force_cleanup: bool) -> Self {
        self.force_cleanup = force_cleanup;
        self
    }

    /// Start from an existing workload cluster (delete and upgrade)
    pub fn with_workload_cluster(mut self, cluster: Cluster) -> Self {
        self.workload_cluster = Some(cluster);
        self
    }

    /// Workflow this context belongs to
    pub fn workflow(&self) -> &'static str {
        self.workflow
    }

    /// Desired cluster description
    pub fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    /// Token that cancels this run, and only this run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether this run starts with a force-cleanup pre-flight
    pub fn force_cleanup(&self) -> bool {
        self.force_cleanup
    }

    /// Progress reporter
    pub fn reporter(&self) -> &dyn ProgressReporter {
        self.reporter.as_ref()
    }

    /// Bootstrap cluster lifecycle collaborator
    pub fn bootstrapper(&self) -> &dyn Bootstrapper {
        self.collaborators.bootstrapper.as_ref()
    }

    /// Infrastructure provider collaborator
    pub fn provider(&self) -> &dyn Provider {
        self.collaborators.provider.as_ref()
    }

    /// Cluster API collaborator
    pub fn cluster_manager(&self) -> &dyn ClusterManager {
        self.collaborators.cluster_manager.as_ref()
    }

    /// GitOps collaborator
    pub fn addon_manager(&self) -> &dyn AddonManager {
        self.collaborators.addon_manager.as_ref()
    }

    /// Artifact writer
    pub fn writer(&self) -> &dyn FileWriter {
        self.collaborators.writer.as_ref()
    }

    /// Bootstrap cluster handle, or `MissingHandle` when none was recorded
    pub fn require_bootstrap(&self) -> Result<&Cluster> {
        self.bootstrap_cluster
            .as_ref()
            .ok_or_else(|| Error::missing_handle("bootstrap"))
    }

    /// Workload cluster handle, or `MissingHandle` when none was recorded
    pub fn require_workload(&self) -> Result<&Cluster> {
        self.workload_cluster
            .as_ref()
            .ok_or_else(|| Error::missing_handle("workload"))
    }

    /// Record a failure raised by `task`
    ///
    /// Only the first error is kept as the run's error. Later ones are logged and
    /// forwarded to the reporter as secondary errors. Returns true when `error`
    /// became the run's error.
    pub fn set_error(&mut self, task: &'static str, error: Error) -> bool {
        let secondary = (!self.errors.is_empty()).then(|| error.clone());
        let primary = self.errors.record(task, error);
        if let Some(error) = secondary {
            warn!(
                workflow = self.workflow,
                task,
                error = %error,
                "Error during cleanup; keeping the original error"
            );
            self.reporter.secondary_error(self.workflow, task, &error);
        }
        primary
    }

    /// Whether an error has been recorded
    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The run's first error
    pub fn original_error(&self) -> Option<&Error> {
        self.errors.primary()
    }

    /// Full error record for the run
    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    /// Names of tasks the runner entered, in order
    pub fn visited(&self) -> &[&'static str] {
        &self.visited
    }

    pub(crate) fn visit(&mut self, task: &'static str) {
        self.visited.push(task);
    }

    /// Deadline shared by every cleanup action of the run
    ///
    /// The window opens the first time cleanup asks for it and is not extended
    /// by later cleanup actions. `None` leaves cleanup unbounded.
    pub(crate) fn cleanup_deadline(&mut self, grace: Option<Duration>) -> Option<Instant> {
        let grace = grace?;
        Some(
            *self
                .cleanup_deadline
                .get_or_insert_with(|| Instant::now() + grace),
        )
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("workflow", &self.workflow)
            .field("cluster", &self.spec.name)
            .field("force_cleanup", &self.force_cleanup)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("bootstrap_cluster", &self.bootstrap_cluster)
            .field("workload_cluster", &self.workload_cluster)
            .field("errors", &self.errors)
            .field("visited", &self.visited)
            .finish()
    }
}
