//! Create workflow
//!
//! Linear: every task hands off to the next on success, and any failure ends
//! the run. The bootstrap cluster is left in place on failure so its logs can
//! be collected.

use async_trait::async_trait;
use tracing::info;

use super::{
    create_bootstrap_cluster, delete_bootstrap_cluster, install_capi_on_bootstrap,
    write_cluster_config,
};
use crate::task::{ExecutionContext, Outcome, Task};
use crate::types::MoveOption;
use crate::{Error, Result};

/// Steps of the create workflow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateTask {
    /// Provider and add-on pre-flight checks
    SetupAndValidate,
    /// Create the bootstrap cluster
    CreateBootstrapCluster,
    /// Install CAPI on the bootstrap cluster
    InstallCapiBootstrap,
    /// Create the workload cluster from the bootstrap cluster
    CreateWorkloadCluster,
    /// Install the CNI on the workload cluster
    InstallNetworking,
    /// Install the default storage class on the workload cluster
    InstallStorageClass,
    /// Install CAPI on the workload cluster
    InstallCapiWorkload,
    /// Move management from the bootstrap cluster to the workload cluster
    MoveManagement,
    /// Install the cluster controller on the workload cluster
    InstallCustomComponents,
    /// Capture datacenter and machine configs with reconcile paused
    PauseDatacenterReconcile,
    /// Create the cluster's own resources on the workload cluster
    CreateEksaResources,
    /// Let the controller take over reconciling those resources
    ResumeControllerReconcile,
    /// Install GitOps add-ons
    InstallGitOpsAddons,
    /// Persist the generated cluster config
    WriteClusterConfig,
    /// Delete the bootstrap cluster
    DeleteBootstrapCluster,
    /// Install machine health checks through the bootstrap cluster handle
    InstallMachineHealthChecks,
}

#[async_trait]
impl Task for CreateTask {
    const WORKFLOW: &'static str = "create";
    const INITIAL: Self = CreateTask::SetupAndValidate;
    const ALL: &'static [Self] = &[
        CreateTask::SetupAndValidate,
        CreateTask::CreateBootstrapCluster,
        CreateTask::InstallCapiBootstrap,
        CreateTask::CreateWorkloadCluster,
        CreateTask::InstallNetworking,
        CreateTask::InstallStorageClass,
        CreateTask::InstallCapiWorkload,
        CreateTask::MoveManagement,
        CreateTask::InstallCustomComponents,
        CreateTask::PauseDatacenterReconcile,
        CreateTask::CreateEksaResources,
        CreateTask::ResumeControllerReconcile,
        CreateTask::InstallGitOpsAddons,
        CreateTask::WriteClusterConfig,
        CreateTask::DeleteBootstrapCluster,
        CreateTask::InstallMachineHealthChecks,
    ];
    const SUCCESS_MESSAGE: &'static str = "Cluster created!";

    fn name(self) -> &'static str {
        match self {
            CreateTask::SetupAndValidate => "setup-and-validate",
            CreateTask::CreateBootstrapCluster => "create-bootstrap-cluster",
            CreateTask::InstallCapiBootstrap => "install-capi-bootstrap",
            CreateTask::CreateWorkloadCluster => "create-workload-cluster",
            CreateTask::InstallNetworking => "install-networking",
            CreateTask::InstallStorageClass => "install-storage-class",
            CreateTask::InstallCapiWorkload => "install-capi-workload",
            CreateTask::MoveManagement => "move-management",
            CreateTask::InstallCustomComponents => "install-custom-components",
            CreateTask::PauseDatacenterReconcile => "pause-datacenter-reconcile",
            CreateTask::CreateEksaResources => "create-eksa-resources",
            CreateTask::ResumeControllerReconcile => "resume-controller-reconcile",
            CreateTask::InstallGitOpsAddons => "install-gitops-addons",
            CreateTask::WriteClusterConfig => "write-cluster-config",
            CreateTask::DeleteBootstrapCluster => "delete-bootstrap-cluster",
            CreateTask::InstallMachineHealthChecks => "install-machine-health-checks",
        }
    }

    fn next(self, outcome: Outcome) -> Option<Self> {
        if outcome == Outcome::Failure {
            return None;
        }
        let position = Self::ALL.iter().position(|&task| task == self)?;
        Self::ALL.get(position + 1).copied()
    }

    fn completes_run(self) -> bool {
        self == CreateTask::InstallMachineHealthChecks
    }

    async fn run(self, ctx: &mut ExecutionContext) -> Result<()> {
        match self {
            CreateTask::SetupAndValidate => setup_and_validate(ctx).await,
            CreateTask::CreateBootstrapCluster => {
                info!("Creating new bootstrap cluster");
                create_bootstrap_cluster(ctx).await
            }
            CreateTask::InstallCapiBootstrap => {
                info!("Installing cluster-api providers on bootstrap cluster");
                install_capi_on_bootstrap(ctx).await
            }
            CreateTask::CreateWorkloadCluster => create_workload_cluster(ctx).await,
            CreateTask::InstallNetworking => {
                info!("Installing networking on workload cluster");
                let workload = ctx.require_workload()?;
                ctx.cluster_manager()
                    .install_networking(workload, ctx.spec())
                    .await
            }
            CreateTask::InstallStorageClass => {
                info!("Installing storage class on workload cluster");
                let workload = ctx.require_workload()?;
                ctx.cluster_manager()
                    .install_storage_class(workload, ctx.provider())
                    .await
            }
            CreateTask::InstallCapiWorkload => {
                info!("Installing cluster-api providers on workload cluster");
                let workload = ctx.require_workload()?;
                ctx.cluster_manager()
                    .install_capi(ctx.spec(), workload, ctx.provider())
                    .await
            }
            CreateTask::MoveManagement => {
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
            CreateTask::InstallCustomComponents => {
                info!("Installing cluster controller on workload cluster");
                let workload = ctx.require_workload()?;
                ctx.cluster_manager()
                    .install_custom_components(ctx.spec(), workload)
                    .await
            }
            CreateTask::PauseDatacenterReconcile => {
                pause_datacenter_reconcile(ctx);
                Ok(())
            }
            CreateTask::CreateEksaResources => create_eksa_resources(ctx).await,
            CreateTask::ResumeControllerReconcile => {
                info!("Resuming cluster controller reconcile");
                let workload = ctx.require_workload()?;
                ctx.cluster_manager()
                    .resume_eksa_controller_reconcile(workload, ctx.spec(), ctx.provider())
                    .await
            }
            CreateTask::InstallGitOpsAddons => {
                info!("Installing GitOps toolkit on workload cluster");
                let workload = ctx.require_workload()?;
                let datacenter = ctx.provider().datacenter_config();
                let machines = ctx.provider().machine_configs();
                ctx.addon_manager()
                    .install_gitops(workload, ctx.spec(), &datacenter, &machines)
                    .await
            }
            CreateTask::WriteClusterConfig => {
                info!("Writing cluster config file");
                write_cluster_config(ctx).await
            }
            CreateTask::DeleteBootstrapCluster => {
                info!("Deleting bootstrap cluster");
                delete_bootstrap_cluster(ctx).await
            }
            CreateTask::InstallMachineHealthChecks => {
                info!("Installing machine health checks");
                let bootstrap = ctx.require_bootstrap()?;
                ctx.cluster_manager()
                    .install_machine_health_checks(bootstrap, ctx.provider())
                    .await
            }
        }
    }
}

async fn setup_and_validate(ctx: &mut ExecutionContext) -> Result<()> {
    info!("Performing setup and validations");
    ctx.provider()
        .setup_and_validate_create_cluster(ctx.spec())
        .await?;
    let provider = ctx.provider().name();
    info!(provider, "Provider validated");
    ctx.addon_manager().validations(ctx.spec()).await
}

async fn create_workload_cluster(ctx: &mut ExecutionContext) -> Result<()> {
    info!("Creating new workload cluster");
    let bootstrap = ctx.require_bootstrap()?;
    let workload = ctx
        .cluster_manager()
        .create_workload_cluster(bootstrap, ctx.spec(), ctx.provider())
        .await?;
    ctx.workload_cluster = Some(workload);
    Ok(())
}

fn pause_datacenter_reconcile(ctx: &mut ExecutionContext) {
    let mut datacenter = ctx.provider().datacenter_config();
    let machines = ctx.provider().machine_configs();
    datacenter.pause_reconcile();
    info!(kind = %datacenter.kind, "Paused datacenter reconcile");
    ctx.datacenter_config = Some(datacenter);
    ctx.machine_configs = machines;
}

async fn create_eksa_resources(ctx: &mut ExecutionContext) -> Result<()> {
    info!("Creating cluster resources on workload cluster");
    let workload = ctx.require_workload()?;
    let datacenter = ctx
        .datacenter_config
        .as_ref()
        .ok_or_else(|| Error::provider("datacenter config was not captured"))?;
    ctx.cluster_manager()
        .create_eksa_resources(workload, ctx.spec(), datacenter, &ctx.machine_configs)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::{MockAddonManager, MockBootstrapper, MockProvider};
    use crate::task::{describe, TaskRunner};
    use crate::workflows::testing::{sample_spec, Call, Harness, BOOTSTRAP_NAME, CLUSTER_NAME};
    use crate::workflows::{Create, WorkflowOptions};
    use rstest::rstest;
    use std::sync::Arc;

    fn full_success_order() -> Vec<Call> {
        vec![
            Call::SetupAndValidateCreate,
            Call::Name,
            Call::Validations,
            Call::BootstrapClusterOpts,
            Call::CreateBootstrapCluster,
            Call::InstallCapi,
            Call::BootstrapSetup,
            Call::CreateWorkloadCluster,
            Call::InstallNetworking,
            Call::InstallStorageClass,
            Call::InstallCapi,
            Call::MoveCapi,
            Call::InstallCustomComponents,
            Call::DatacenterConfig,
            Call::MachineConfigs,
            Call::CreateEksaResources,
            Call::ResumeEksaControllerReconcile,
            Call::DatacenterConfig,
            Call::MachineConfigs,
            Call::InstallGitOps,
            Call::DatacenterConfig,
            Call::MachineConfigs,
            Call::Write,
            Call::DeleteBootstrapCluster,
            Call::InstallMachineHealthChecks,
        ]
    }

    // ==========================================================================
    // Story Tests: Creating a Cluster
    // ==========================================================================

    /// Story: every collaborator succeeds and calls happen in one total order
    #[tokio::test]
    async fn story_create_success_follows_exact_call_order() {
        let harness = Harness::new();
        let workflow = Create::new(harness.collaborators(), WorkflowOptions::default());
        let mut ctx = workflow.context(sample_spec());

        workflow.run(&mut ctx).await.unwrap();

        assert_eq!(harness.calls(), full_success_order());
        assert_eq!(ctx.visited().len(), CreateTask::ALL.len());
        assert_eq!(ctx.workload_cluster.as_ref().unwrap().name, CLUSTER_NAME);
        assert!(!harness.called(Call::SaveLogs));
    }

    /// Story: each call targets the cluster that exists at that point
    #[tokio::test]
    async fn story_create_targets_the_right_clusters() {
        let harness = Harness::new();
        let workflow = Create::new(harness.collaborators(), WorkflowOptions::default());
        let mut ctx = workflow.context(sample_spec());

        workflow.run(&mut ctx).await.unwrap();

        assert_eq!(harness.targets(Call::InstallCapi), vec![BOOTSTRAP_NAME, CLUSTER_NAME]);
        assert_eq!(harness.targets(Call::BootstrapSetup), vec![BOOTSTRAP_NAME]);
        assert_eq!(
            harness.targets(Call::MoveCapi),
            vec![format!(
                "{}->{} [WaitForNodeRef, WaitForNodesHealthy]",
                BOOTSTRAP_NAME, CLUSTER_NAME
            )]
        );
        assert_eq!(
            harness.targets(Call::CreateEksaResources),
            vec![format!("{} paused=true", CLUSTER_NAME)]
        );
        assert_eq!(harness.targets(Call::Write), vec!["test-cluster-eks-a-cluster.yaml"]);
        assert_eq!(harness.targets(Call::DeleteBootstrapCluster), vec![BOOTSTRAP_NAME]);
        assert_eq!(harness.targets(Call::InstallMachineHealthChecks), vec![BOOTSTRAP_NAME]);
    }

    /// Story: force cleanup deletes a leftover bootstrap cluster before anything else
    #[tokio::test]
    async fn story_create_force_cleanup_runs_first() {
        let harness = Harness::new();
        let workflow = Create::new(
            harness.collaborators(),
            WorkflowOptions {
                force_cleanup: true,
                ..Default::default()
            },
        );
        let mut ctx = workflow.context(sample_spec());

        workflow.run(&mut ctx).await.unwrap();

        let mut expected = vec![Call::DeleteBootstrapCluster];
        expected.extend(full_success_order());
        assert_eq!(harness.calls(), expected);
        assert_eq!(
            harness.targets(Call::DeleteBootstrapCluster),
            vec![CLUSTER_NAME, BOOTSTRAP_NAME]
        );
    }

    /// Story: a failure anywhere ends the run there; logs are collected once
    /// unless the run never got past its pre-flight checks
    #[rstest]
    #[case::setup(Call::SetupAndValidateCreate, "setup-and-validate", 0)]
    #[case::validations(Call::Validations, "setup-and-validate", 0)]
    #[case::bootstrap_opts(Call::BootstrapClusterOpts, "create-bootstrap-cluster", 1)]
    #[case::bootstrap(Call::CreateBootstrapCluster, "create-bootstrap-cluster", 1)]
    #[case::bootstrap_setup(Call::BootstrapSetup, "install-capi-bootstrap", 1)]
    #[case::workload(Call::CreateWorkloadCluster, "create-workload-cluster", 1)]
    #[case::networking(Call::InstallNetworking, "install-networking", 1)]
    #[case::storage(Call::InstallStorageClass, "install-storage-class", 1)]
    #[case::move_capi(Call::MoveCapi, "move-management", 1)]
    #[case::custom_components(Call::InstallCustomComponents, "install-custom-components", 1)]
    #[case::resources(Call::CreateEksaResources, "create-eksa-resources", 1)]
    #[case::resume(Call::ResumeEksaControllerReconcile, "resume-controller-reconcile", 1)]
    #[case::gitops(Call::InstallGitOps, "install-gitops-addons", 1)]
    #[case::write(Call::Write, "write-cluster-config", 1)]
    #[case::delete_bootstrap(Call::DeleteBootstrapCluster, "delete-bootstrap-cluster", 1)]
    #[case::health_checks(Call::InstallMachineHealthChecks, "install-machine-health-checks", 1)]
    #[tokio::test]
    async fn story_create_failure_terminates(
        #[case] failing: Call,
        #[case] last_task: &str,
        #[case] log_collections: usize,
    ) {
        let harness = Harness::new().fail(failing, "injected");
        let workflow = Create::new(harness.collaborators(), WorkflowOptions::default());
        let mut ctx = workflow.context(sample_spec());

        let err = workflow.run(&mut ctx).await.unwrap_err();

        assert!(err.to_string().contains("injected"));
        assert_eq!(ctx.visited().last().copied(), Some(last_task));
        assert_eq!(harness.count(Call::SaveLogs), log_collections);
        if log_collections > 0 {
            assert_eq!(harness.calls().last(), Some(&Call::SaveLogs));
        }
        assert!(ctx.errors().secondary().is_empty());
    }

    /// Story: a failed setup never reaches the bootstrapper (mock collaborators)
    #[tokio::test]
    async fn story_create_setup_failure_never_touches_bootstrapper() {
        let mut provider = MockProvider::new();
        provider
            .expect_setup_and_validate_create_cluster()
            .times(1)
            .returning(|_| Err(Error::validation("unsupported kubernetes version")));
        provider.expect_bootstrap_cluster_opts().times(0);

        let mut bootstrapper = MockBootstrapper::new();
        bootstrapper.expect_create_bootstrap_cluster().times(0);
        bootstrapper.expect_delete_bootstrap_cluster().times(0);

        let mut addons = MockAddonManager::new();
        addons.expect_validations().times(0);

        let harness = Harness::new();
        let mut collaborators = harness.collaborators();
        collaborators.provider = Arc::new(provider);
        collaborators.bootstrapper = Arc::new(bootstrapper);
        collaborators.addon_manager = Arc::new(addons);

        let workflow = Create::new(collaborators, WorkflowOptions::default());
        let mut ctx = workflow.context(sample_spec());

        let err = workflow.run(&mut ctx).await.unwrap_err();

        assert!(err.is_validation());
        assert!(harness.calls().is_empty());
    }

    /// Story: a bootstrap handle is only recorded after creation succeeds
    #[tokio::test]
    async fn story_failed_bootstrap_create_records_no_handle() {
        let harness = Harness::new().fail(Call::CreateBootstrapCluster, "kind failed");
        let mut ctx = harness.context("create");

        let err = TaskRunner::new()
            .run(CreateTask::INITIAL, &mut ctx)
            .await
            .unwrap_err();

        assert_eq!(err, Error::bootstrap("kind failed"));
        assert!(ctx.bootstrap_cluster.is_none());
    }

    #[test]
    fn create_graph_is_linear_and_fails_closed() {
        let table = describe::<CreateTask>();
        assert_eq!(table.len(), 16);
        for (row, next) in table.iter().zip(table.iter().skip(1)) {
            assert_eq!(row.on_success, Some(next.from));
        }
        assert!(table.iter().all(|row| row.on_failure.is_none()));
        assert!(table.iter().all(|row| !row.cleanup));
        let terminal: Vec<_> = table.iter().filter(|row| row.terminal).map(|row| row.from).collect();
        assert_eq!(terminal, vec!["install-machine-health-checks"]);
    }
}
