//! Delete workflow
//!
//! Management of the workload cluster is moved onto a fresh bootstrap cluster,
//! which then deletes it. Failures do not simply unwind: each failure point
//! has its own compensation. A failure before the bootstrap cluster exists
//! skips bootstrap teardown, and a failure after the workload cluster is gone
//! still tears the bootstrap cluster down.

use async_trait::async_trait;
use tracing::info;

use super::create_bootstrap_cluster;
use crate::task::{ExecutionContext, Outcome, Task};
use crate::types::MoveOption;
use crate::Result;

/// Steps of the delete workflow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteTask {
    /// Provider pre-delete validation
    SetupAndValidate,
    /// Create the bootstrap cluster that will own the deletion
    CreateManagementCluster,
    /// Install CAPI on the bootstrap cluster
    InstallCapi,
    /// Move management of the workload cluster onto the bootstrap cluster
    MoveClusterManagement,
    /// Delete the workload cluster's infrastructure
    DeleteWorkloadCluster,
    /// Remove the cluster's entry from the GitOps repository
    CleanupGitRepo,
    /// Delete the bootstrap cluster, when one exists
    DeleteManagementCluster,
    /// Release remaining provider-level infrastructure
    CleanupProviderInfrastructure,
}

#[async_trait]
impl Task for DeleteTask {
    const WORKFLOW: &'static str = "delete";
    const INITIAL: Self = DeleteTask::SetupAndValidate;
    const ALL: &'static [Self] = &[
        DeleteTask::SetupAndValidate,
        DeleteTask::CreateManagementCluster,
        DeleteTask::InstallCapi,
        DeleteTask::MoveClusterManagement,
        DeleteTask::DeleteWorkloadCluster,
        DeleteTask::CleanupGitRepo,
        DeleteTask::DeleteManagementCluster,
        DeleteTask::CleanupProviderInfrastructure,
    ];
    const SUCCESS_MESSAGE: &'static str = "Cluster deleted!";

    fn name(self) -> &'static str {
        match self {
            DeleteTask::SetupAndValidate => "setup-and-validate",
            DeleteTask::CreateManagementCluster => "management-cluster-init",
            DeleteTask::InstallCapi => "install-capi",
            DeleteTask::MoveClusterManagement => "cluster-management-move",
            DeleteTask::DeleteWorkloadCluster => "delete-workload-cluster",
            DeleteTask::CleanupGitRepo => "clean-up-git-repo",
            DeleteTask::DeleteManagementCluster => "kind-cluster-delete",
            DeleteTask::CleanupProviderInfrastructure => "cleanup-provider-infrastructure",
        }
    }

    fn next(self, outcome: Outcome) -> Option<Self> {
        use DeleteTask::*;
        use Outcome::*;

        match (self, outcome) {
            (SetupAndValidate, Success) => Some(CreateManagementCluster),
            (SetupAndValidate, Failure) => None,
            (CreateManagementCluster, Success) => Some(InstallCapi),
            (CreateManagementCluster, Failure) => Some(DeleteManagementCluster),
            (InstallCapi, Success) => Some(MoveClusterManagement),
            (InstallCapi, Failure) => Some(DeleteManagementCluster),
            (MoveClusterManagement, Success) => Some(DeleteWorkloadCluster),
            (MoveClusterManagement, Failure) => None,
            (DeleteWorkloadCluster, Success) => Some(CleanupGitRepo),
            (DeleteWorkloadCluster, Failure) => None,
            (CleanupGitRepo, _) => Some(DeleteManagementCluster),
            (DeleteManagementCluster, _) => Some(CleanupProviderInfrastructure),
            (CleanupProviderInfrastructure, _) => None,
        }
    }

    fn is_cleanup(self) -> bool {
        matches!(
            self,
            DeleteTask::DeleteManagementCluster | DeleteTask::CleanupProviderInfrastructure
        )
    }

    fn completes_run(self) -> bool {
        self == DeleteTask::CleanupProviderInfrastructure
    }

    async fn run(self, ctx: &mut ExecutionContext) -> Result<()> {
        match self {
            DeleteTask::SetupAndValidate => {
                info!("Performing provider setup and validations");
                ctx.provider().setup_and_validate_delete_cluster().await
            }
            DeleteTask::CreateManagementCluster => {
                info!("Creating management cluster");
                create_bootstrap_cluster(ctx).await
            }
            DeleteTask::InstallCapi => {
                info!("Installing cluster-api providers on management cluster");
                let bootstrap = ctx.require_bootstrap()?;
                ctx.cluster_manager()
                    .install_capi(ctx.spec(), bootstrap, ctx.provider())
                    .await
            }
            DeleteTask::MoveClusterManagement => {
                info!("Moving cluster management from workload cluster");
                let workload = ctx.require_workload()?;
                let bootstrap = ctx.require_bootstrap()?;
                ctx.cluster_manager()
                    .move_capi(workload, bootstrap, &[MoveOption::WaitForNodeRef])
                    .await
            }
            DeleteTask::DeleteWorkloadCluster => {
                info!("Deleting workload cluster");
                let bootstrap = ctx.require_bootstrap()?;
                let workload = ctx.require_workload()?;
                ctx.cluster_manager()
                    .delete_cluster(bootstrap, workload)
                    .await
            }
            DeleteTask::CleanupGitRepo => {
                info!("Clean up Git Repo");
                ctx.addon_manager().cleanup_git_repo(ctx.spec()).await
            }
            DeleteTask::DeleteManagementCluster => match ctx.bootstrap_cluster.as_ref() {
                Some(bootstrap) => {
                    info!(bootstrap = %bootstrap.name, "Deleting management cluster");
                    ctx.bootstrapper()
                        .delete_bootstrap_cluster(bootstrap, false)
                        .await
                }
                None => {
                    info!("Bootstrap cluster information missing - skipping delete kind cluster");
                    Ok(())
                }
            },
            DeleteTask::CleanupProviderInfrastructure => {
                ctx.provider().cleanup_provider_infrastructure().await
            }
        }
    }
}
