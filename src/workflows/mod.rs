//! Cluster lifecycle workflows
//!
//! Each workflow is a task enum (its graph) run through the shared
//! [`Workflow`] driver, which adds what happens outside the graph: the
//! force-cleanup pre-flight and diagnostic log collection after a failed run.

mod create;
mod delete;
mod upgrade;

#[cfg(test)]
pub(crate) mod testing;

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::task::{Collaborators, ExecutionContext, ProgressReporter, Task, TaskRunner, TracingReporter};
use crate::types::{Cluster, ClusterSpec, DatacenterConfig, MachineConfig, WriteOption};
use crate::{Error, Result};

pub use create::CreateTask;
pub use delete::DeleteTask;
pub use upgrade::UpgradeTask;

/// Create a new cluster through a temporary bootstrap cluster
pub type Create = Workflow<CreateTask>;

/// Delete a cluster after moving its management onto a bootstrap cluster
pub type Delete = Workflow<DeleteTask>;

/// Upgrade a cluster while a bootstrap cluster holds its management
pub type Upgrade = Workflow<UpgradeTask>;

/// Task name under which a failed force-cleanup pre-flight is recorded
pub const FORCE_CLEANUP: &str = "force-cleanup";

/// Name under which a failed log collection is recorded
pub const SAVE_LOGS: &str = "save-logs";

/// Default window for a run's cleanup tasks and log collection
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(600);

/// Run-mode switches decided before a run starts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowOptions {
    /// Delete any leftover bootstrap cluster named after the target cluster first
    pub force_cleanup: bool,
    /// Upper bound on the forward part of a run
    pub timeout: Option<Duration>,
    /// Upper bound on everything a run does after its forward part: cleanup
    /// tasks and log collection share this one window
    pub cleanup_timeout: Option<Duration>,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            force_cleanup: false,
            timeout: None,
            cleanup_timeout: Some(DEFAULT_CLEANUP_TIMEOUT),
        }
    }
}

/// Drives one workflow's task graph against a set of collaborators
pub struct Workflow<T: Task> {
    collaborators: Collaborators,
    options: WorkflowOptions,
    reporter: Arc<dyn ProgressReporter>,
    runner: TaskRunner,
    _task: PhantomData<fn() -> T>,
}

impl<T: Task> Workflow<T> {
    /// Create a workflow over the given collaborators
    pub fn new(collaborators: Collaborators, options: WorkflowOptions) -> Self {
        let runner = TaskRunner::new()
            .with_timeout(options.timeout)
            .with_cleanup_grace(options.cleanup_timeout);
        Self {
            collaborators,
            options,
            reporter: Arc::new(TracingReporter),
            runner,
            _task: PhantomData,
        }
    }

    /// Send progress to `reporter` instead of `tracing`
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run options
    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    /// Fresh execution context for one run against `spec`
    ///
    /// Each context carries its own cancellation token; cancel a run through
    /// [`ExecutionContext::cancellation_token`].
    pub fn context(&self, spec: ClusterSpec) -> ExecutionContext {
        ExecutionContext::new(T::WORKFLOW, spec, self.collaborators.clone())
            .with_reporter(self.reporter.clone())
            .with_force_cleanup(self.options.force_cleanup)
    }

    /// Run the workflow to completion
    ///
    /// When a run fails after its pre-flight checks, logs are collected once from
    /// whatever bootstrap cluster exists. The returned error is always the run's
    /// first error.
    pub async fn run(&self, ctx: &mut ExecutionContext) -> Result<()> {
        info!(workflow = T::WORKFLOW, cluster = %ctx.spec().name, "Starting workflow");

        if ctx.force_cleanup() {
            force_cleanup(ctx).await?;
        }

        let result = self.runner.run(T::INITIAL, ctx).await;
        if result.is_err() {
            if ctx.errors().primary_task() == Some(T::INITIAL.name()) {
                debug!(
                    workflow = T::WORKFLOW,
                    "Pre-flight checks failed before anything was provisioned; skipping log collection"
                );
            } else {
                collect_logs(ctx, self.runner.cleanup_grace()).await;
            }
        }
        result
    }
}

/// Delete a bootstrap cluster left over from an earlier run
///
/// Runs outside the task graph. A failure aborts the run before anything else
/// is touched.
async fn force_cleanup(ctx: &mut ExecutionContext) -> Result<()> {
    let name = ctx
        .workload_cluster
        .as_ref()
        .map(|c| c.name.clone())
        .unwrap_or_else(|| ctx.spec().name.clone());
    info!(workflow = ctx.workflow(), cluster = %name, "Force deleting bootstrap cluster");

    let leftover = Cluster::named(name);
    let result = ctx
        .bootstrapper()
        .delete_bootstrap_cluster(&leftover, false)
        .await;
    if let Err(err) = result {
        ctx.set_error(FORCE_CLEANUP, err.clone());
        return Err(err);
    }
    Ok(())
}

/// Collect diagnostics after a failed run, within the run's cleanup window
async fn collect_logs(ctx: &mut ExecutionContext, grace: Option<Duration>) {
    let deadline = ctx.cleanup_deadline(grace);
    let save = ctx.cluster_manager().save_logs(ctx.bootstrap_cluster.as_ref());
    let result = match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, save)
            .await
            .unwrap_or_else(|_| Err(Error::DeadlineExceeded(SAVE_LOGS.to_string()))),
        None => save.await,
    };
    if let Err(err) = result {
        warn!(workflow = ctx.workflow(), error = %err, "Failed to collect logs");
        ctx.set_error(SAVE_LOGS, err);
    }
}

// =============================================================================
// Actions shared by several workflows
// =============================================================================

/// Create the bootstrap cluster with the provider's options and record its handle
async fn create_bootstrap_cluster(ctx: &mut ExecutionContext) -> Result<()> {
    let opts = ctx.provider().bootstrap_cluster_opts()?;
    let cluster = ctx
        .bootstrapper()
        .create_bootstrap_cluster(ctx.spec(), &opts)
        .await?;
    info!(workflow = ctx.workflow(), bootstrap = %cluster.name, "Bootstrap cluster created");
    ctx.bootstrap_cluster = Some(cluster);
    Ok(())
}

/// Install CAPI on the bootstrap cluster and let the provider prepare it
async fn install_capi_on_bootstrap(ctx: &mut ExecutionContext) -> Result<()> {
    let bootstrap = ctx.require_bootstrap()?;
    ctx.cluster_manager()
        .install_capi(ctx.spec(), bootstrap, ctx.provider())
        .await?;
    ctx.provider().bootstrap_setup(ctx.spec(), bootstrap).await
}

/// Delete the bootstrap cluster
async fn delete_bootstrap_cluster(ctx: &mut ExecutionContext) -> Result<()> {
    let bootstrap = ctx.require_bootstrap()?;
    ctx.bootstrapper()
        .delete_bootstrap_cluster(bootstrap, false)
        .await
}

/// Render and persist the cluster configuration
async fn write_cluster_config(ctx: &mut ExecutionContext) -> Result<()> {
    let datacenter = ctx.provider().datacenter_config();
    let machines = ctx.provider().machine_configs();
    let content = render_cluster_config(ctx.spec(), &datacenter, &machines)?;

    let path = ctx.writer().write(
        &ctx.spec().config_file_name(),
        content.as_bytes(),
        &[WriteOption::Persistent],
    )?;
    info!(workflow = ctx.workflow(), path = %path.display(), "Cluster config written");
    Ok(())
}

/// Render the cluster spec, datacenter config and machine configs as one
/// multi-document YAML file
pub fn render_cluster_config(
    spec: &ClusterSpec,
    datacenter: &DatacenterConfig,
    machines: &[MachineConfig],
) -> Result<String> {
    let mut docs = vec![to_yaml(spec)?, to_yaml(datacenter)?];
    for machine in machines {
        docs.push(to_yaml(machine)?);
    }
    debug!(documents = docs.len(), "Rendered cluster config");
    Ok(docs.join("---\n"))
}

fn to_yaml<S: serde::Serialize>(value: &S) -> Result<String> {
    serde_yaml::to_string(value)
        .map_err(|e| Error::write(format!("failed to render cluster config: {}", e)))
}
