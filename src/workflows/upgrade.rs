//! Upgrade workflow
//!
//! Management moves onto a bootstrap cluster for the duration of the rollout,
//! then back to the workload cluster. Only failures that happen while the
//! workload cluster manages itself (before the first move, or after the move
//! back) delete the bootstrap cluster. Anything in between leaves it running,
//! since it may be the only cluster managing the workload.

use async_trait::async_trait;
use tracing::info;

use super::{
    create_bootstrap_cluster, delete_bootstrap_cluster, install_capi_on_bootstrap,
    write_cluster_config,
};
use crate::task::{ExecutionContext, Outcome, Task};
use crate::types::MoveOption;
use crate::Result;

/// Steps of the upgrade workflow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradeTask {
    /// Provider and add-on pre-flight checks
    SetupAndValidate,
    /// Create the bootstrap cluster
    CreateBootstrapCluster,
    /// Install CAPI on the bootstrap cluster
    InstallCapiBootstrap,
    /// Move management from the workload cluster to the bootstrap cluster
    MoveManagementToBootstrap,
    /// Roll the workload cluster to the desired spec
    UpgradeWorkloadCluster,
    /// Move management back to the workload cluster
    MoveManagementToWorkload,
    /// Persist the updated cluster config
    WriteClusterConfig,
    /// Delete the bootstrap cluster
    DeleteBootstrapCluster,
}

#[async_trait]
impl Task for UpgradeTask {
    const WORKFLOW: &'static str = "upgrade";
    const INITIAL: Self = UpgradeTask::SetupAndValidate;
    const ALL: &'static [Self] = &[
        UpgradeTask::SetupAndValidate,
        UpgradeTask::CreateBootstrapCluster,
        UpgradeTask::InstallCapiBootstrap,
        UpgradeTask::MoveManagementToBootstrap,
        UpgradeTask::UpgradeWorkloadCluster,
        UpgradeTask::MoveManagementToWorkload,
        UpgradeTask::WriteClusterConfig,
        UpgradeTask::DeleteBootstrapCluster,
    ];
    const SUCCESS_MESSAGE: &'static str = "Cluster upgraded!";

    fn name(self) -> &'static str {
        match self {
            UpgradeTask::SetupAndValidate => "setup-and-validate",
            UpgradeTask::CreateBootstrapCluster => "create-bootstrap-cluster",
            UpgradeTask::InstallCapiBootstrap => "install-capi-bootstrap",
            UpgradeTask::MoveManagementToBootstrap => "move-management-to-bootstrap",
            UpgradeTask::UpgradeWorkloadCluster => "upgrade-workload-cluster",
            UpgradeTask::MoveManagementToWorkload => "move-management-to-workload",
            UpgradeTask::WriteClusterConfig => "write-cluster-config",
            UpgradeTask::DeleteBootstrapCluster => "delete-bootstrap-cluster",
        }
    }

    fn next(self, outcome: Outcome) -> Option<Self> {
        match (self, outcome) {
            (UpgradeTask::SetupAndValidate, Outcome::Success) => {
                Some(UpgradeTask::CreateBootstrapCluster)
            }
            (UpgradeTask::CreateBootstrapCluster, Outcome::Success) => {
                Some(UpgradeTask::InstallCapiBootstrap)
            }
            (UpgradeTask::InstallCapiBootstrap, Outcome::Success) => {
                Some(UpgradeTask::MoveManagementToBootstrap)
            }
            (UpgradeTask::InstallCapiBootstrap, Outcome::Failure) => {
                Some(UpgradeTask::DeleteBootstrapCluster)
            }
            (UpgradeTask::MoveManagementToBootstrap, Outcome::Success) => {
                Some(UpgradeTask::UpgradeWorkloadCluster)
            }
            (UpgradeTask::UpgradeWorkloadCluster, Outcome::Success) => {
                Some(UpgradeTask::MoveManagementToWorkload)
            }
            (UpgradeTask::MoveManagementToWorkload, Outcome::Success) => {
                Some(UpgradeTask::WriteClusterConfig)
            }
            (UpgradeTask::WriteClusterConfig, _) => Some(UpgradeTask::DeleteBootstrapCluster),
            _ => None,
        }
    }

    fn is_cleanup(self) -> bool {
        self == UpgradeTask::DeleteBootstrapCluster
    }

    fn completes_run(self) -> bool {
        self == UpgradeTask::DeleteBootstrapCluster
    }

    async fn run(self, ctx: &mut ExecutionContext) -> Result<()> {
        match self {
            UpgradeTask::SetupAndValidate => {
                info!("Performing setup and validations");
                ctx.provider()
                    .setup_and_validate_upgrade_cluster(ctx.spec())
                    .await?;
                ctx.addon_manager().validations(ctx.spec()).await
            }
            UpgradeTask::CreateBootstrapCluster => {
                info!("Creating bootstrap cluster");
                create_bootstrap_cluster(ctx).await
            }
            UpgradeTask::InstallCapiBootstrap => {
                info!("Installing cluster-api providers on bootstrap cluster");
                install_capi_on_bootstrap(ctx).await
            }
            UpgradeTask::MoveManagementToBootstrap => {
                info!("Moving cluster management from workload to bootstrap cluster");
                let workload = ctx.require_workload()?;
                let bootstrap = ctx.require_bootstrap()?;
                ctx.cluster_manager()
                    .move_capi(workload, bootstrap, &[MoveOption::WaitForNodeRef])
                    .await
            }
            UpgradeTask::UpgradeWorkloadCluster => {
                info!("Upgrading workload cluster");
                let bootstrap = ctx.require_bootstrap()?;
                let workload = ctx.require_workload()?;
                ctx.cluster_manager()
                    .upgrade_cluster(bootstrap, workload, ctx.spec(), ctx.provider())
                    .await
            }
            UpgradeTask::MoveManagementToWorkload => {
                info!("Moving cluster management from bootstrap to workload cluster");
                let bootstrap = ctx.require_bootstrap()?;
                let workload = ctx.require_workload()?;
                ctx.cluster_manager()
                    .move_capi(
                        bootstrap,
                        workload,
                        &[MoveOption::WaitForNodeRef, MoveOption::WaitForNodesHealthy],
                    )
                    .await
            }
            UpgradeTask::WriteClusterConfig => {
                info!("Writing cluster config file");
                write_cluster_config(ctx).await
            }
            UpgradeTask::DeleteBootstrapCluster => {
                info!("Deleting bootstrap cluster");
                delete_bootstrap_cluster(ctx).await
            }
        }
    }
}
