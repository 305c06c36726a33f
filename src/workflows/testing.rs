//! Recording fakes for workflow tests
//!
//! Every fake appends to one shared call log, so tests can assert the exact
//! order of collaborator invocations across all collaborators. Failures and
//! slow calls are injected per [`Call`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::interfaces::{AddonManager, Bootstrapper, ClusterManager, FileWriter, Provider};
use crate::task::{Collaborators, ExecutionContext};
use crate::types::{
    BootstrapClusterOption, Cluster, ClusterSpec, DatacenterConfig, MachineConfig, MoveOption,
    WriteOption,
};
use crate::{Error, Result};

/// Name of the cluster in [`sample_spec`]
pub const CLUSTER_NAME: &str = "test-cluster";

/// Name of the bootstrap cluster the fake bootstrapper creates
pub const BOOTSTRAP_NAME: &str = "test-cluster-bootstrap";

/// Collaborator method identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    CreateBootstrapCluster,
    DeleteBootstrapCluster,
    Name,
    SetupAndValidateCreate,
    SetupAndValidateDelete,
    SetupAndValidateUpgrade,
    BootstrapClusterOpts,
    BootstrapSetup,
    CleanupProviderInfrastructure,
    DatacenterConfig,
    MachineConfigs,
    InstallCapi,
    CreateWorkloadCluster,
    UpgradeCluster,
    DeleteCluster,
    InstallNetworking,
    InstallStorageClass,
    MoveCapi,
    InstallCustomComponents,
    CreateEksaResources,
    ResumeEksaControllerReconcile,
    InstallMachineHealthChecks,
    SaveLogs,
    Validations,
    InstallGitOps,
    CleanupGitRepo,
    Write,
}

impl Call {
    fn error(self, msg: &str) -> Error {
        match self {
            Call::CreateBootstrapCluster | Call::DeleteBootstrapCluster => Error::bootstrap(msg),
            Call::Name
            | Call::SetupAndValidateCreate
            | Call::SetupAndValidateDelete
            | Call::SetupAndValidateUpgrade
            | Call::BootstrapClusterOpts
            | Call::BootstrapSetup
            | Call::CleanupProviderInfrastructure
            | Call::DatacenterConfig
            | Call::MachineConfigs => Error::provider(msg),
            Call::Validations | Call::InstallGitOps | Call::CleanupGitRepo => Error::addon(msg),
            Call::Write => Error::write(msg),
            _ => Error::cluster_management(msg),
        }
    }
}

/// One recorded collaborator call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Which method was called
    pub call: Call,
    /// Main argument, rendered (cluster name, `from->to` for moves, file name)
    pub target: String,
}

#[derive(Default)]
struct CallLog {
    calls: Mutex<Vec<Invocation>>,
    failures: Mutex<HashMap<Call, String>>,
    delays: Mutex<HashMap<Call, Duration>>,
}

impl CallLog {
    fn record(&self, call: Call, target: impl Into<String>) -> Result<()> {
        self.calls.lock().unwrap().push(Invocation {
            call,
            target: target.into(),
        });
        match self.failures.lock().unwrap().get(&call) {
            Some(msg) => Err(call.error(msg)),
            None => Ok(()),
        }
    }

    async fn enter(&self, call: Call, target: impl Into<String>) -> Result<()> {
        let delay = self.delays.lock().unwrap().get(&call).copied();
        let result = self.record(call, target);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

/// Shared fakes plus their call log
#[derive(Clone, Default)]
pub struct Harness {
    log: Arc<CallLog>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `call` fail with `msg`, mapped onto the collaborator's error family
    pub fn fail(self, call: Call, msg: &str) -> Self {
        self.log
            .failures
            .lock()
            .unwrap()
            .insert(call, msg.to_string());
        self
    }

    /// Make `call` take `delay` before returning
    pub fn slow(self, call: Call, delay: Duration) -> Self {
        self.log.delays.lock().unwrap().insert(call, delay);
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.log.calls.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.invocations().into_iter().map(|i| i.call).collect()
    }

    pub fn called(&self, call: Call) -> bool {
        self.count(call) > 0
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls().into_iter().filter(|c| *c == call).count()
    }

    /// Targets passed to every invocation of `call`, in order
    pub fn targets(&self, call: Call) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|i| i.call == call)
            .map(|i| i.target)
            .collect()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            bootstrapper: Arc::new(FakeBootstrapper(self.log.clone())),
            provider: Arc::new(FakeProvider(self.log.clone())),
            cluster_manager: Arc::new(FakeClusterManager(self.log.clone())),
            addon_manager: Arc::new(FakeAddonManager(self.log.clone())),
            writer: Arc::new(FakeWriter(self.log.clone())),
        }
    }

    pub fn context(&self, workflow: &'static str) -> ExecutionContext {
        ExecutionContext::new(workflow, sample_spec(), self.collaborators())
    }
}

pub fn sample_spec() -> ClusterSpec {
    ClusterSpec::new(CLUSTER_NAME, "1.31", "VSphereDatacenterConfig")
}

fn name_of(cluster: Option<&Cluster>) -> String {
    cluster
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "<none>".to_string())
}

struct FakeBootstrapper(Arc<CallLog>);

#[async_trait]
impl Bootstrapper for FakeBootstrapper {
    async fn create_bootstrap_cluster(
        &self,
        spec: &ClusterSpec,
        _opts: &[BootstrapClusterOption],
    ) -> Result<Cluster> {
        self.0.enter(Call::CreateBootstrapCluster, &spec.name).await?;
        Ok(Cluster::named(BOOTSTRAP_NAME))
    }

    async fn delete_bootstrap_cluster(&self, cluster: &Cluster, _keep: bool) -> Result<()> {
        self.0.enter(Call::DeleteBootstrapCluster, &cluster.name).await
    }
}

struct FakeProvider(Arc<CallLog>);

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &'static str {
        // Infallible by signature; the call is still recorded.
        let _ = self.0.record(Call::Name, "");
        "fake"
    }

    async fn setup_and_validate_create_cluster(&self, spec: &ClusterSpec) -> Result<()> {
        self.0.enter(Call::SetupAndValidateCreate, &spec.name).await
    }

    async fn setup_and_validate_delete_cluster(&self) -> Result<()> {
        self.0.enter(Call::SetupAndValidateDelete, "").await
    }

    async fn setup_and_validate_upgrade_cluster(&self, spec: &ClusterSpec) -> Result<()> {
        self.0.enter(Call::SetupAndValidateUpgrade, &spec.name).await
    }

    fn bootstrap_cluster_opts(&self) -> Result<Vec<BootstrapClusterOption>> {
        self.0.record(Call::BootstrapClusterOpts, "")?;
        Ok(vec![BootstrapClusterOption::ExtraDockerMounts])
    }

    async fn bootstrap_setup(&self, _spec: &ClusterSpec, bootstrap: &Cluster) -> Result<()> {
        self.0.enter(Call::BootstrapSetup, &bootstrap.name).await
    }

    async fn cleanup_provider_infrastructure(&self) -> Result<()> {
        self.0.enter(Call::CleanupProviderInfrastructure, "").await
    }

    fn datacenter_config(&self) -> DatacenterConfig {
        let _ = self.0.record(Call::DatacenterConfig, "");
        DatacenterConfig::new("VSphereDatacenterConfig", CLUSTER_NAME)
    }

    fn machine_configs(&self) -> Vec<MachineConfig> {
        let _ = self.0.record(Call::MachineConfigs, "");
        vec![
            MachineConfig::new("VSphereMachineConfig", "test-cluster-cp"),
            MachineConfig::new("VSphereMachineConfig", "test-cluster-md"),
        ]
    }
}

struct FakeClusterManager(Arc<CallLog>);

#[async_trait]
impl ClusterManager for FakeClusterManager {
    async fn install_capi(
        &self,
        _spec: &ClusterSpec,
        cluster: &Cluster,
        _provider: &dyn Provider,
    ) -> Result<()> {
        self.0.enter(Call::InstallCapi, &cluster.name).await
    }

    async fn create_workload_cluster(
        &self,
        management: &Cluster,
        spec: &ClusterSpec,
        _provider: &dyn Provider,
    ) -> Result<Cluster> {
        self.0
            .enter(Call::CreateWorkloadCluster, &management.name)
            .await?;
        Ok(Cluster::named(&spec.name))
    }

    async fn upgrade_cluster(
        &self,
        _management: &Cluster,
        workload: &Cluster,
        _spec: &ClusterSpec,
        _provider: &dyn Provider,
    ) -> Result<()> {
        self.0.enter(Call::UpgradeCluster, &workload.name).await
    }

    async fn delete_cluster(&self, _management: &Cluster, workload: &Cluster) -> Result<()> {
        self.0.enter(Call::DeleteCluster, &workload.name).await
    }

    async fn install_networking(&self, cluster: &Cluster, _spec: &ClusterSpec) -> Result<()> {
        self.0.enter(Call::InstallNetworking, &cluster.name).await
    }

    async fn install_storage_class(
        &self,
        cluster: &Cluster,
        _provider: &dyn Provider,
    ) -> Result<()> {
        self.0.enter(Call::InstallStorageClass, &cluster.name).await
    }

    async fn move_capi(&self, from: &Cluster, to: &Cluster, opts: &[MoveOption]) -> Result<()> {
        let target = format!("{}->{} {:?}", from.name, to.name, opts);
        self.0.enter(Call::MoveCapi, target).await
    }

    async fn install_custom_components(
        &self,
        _spec: &ClusterSpec,
        cluster: &Cluster,
    ) -> Result<()> {
        self.0.enter(Call::InstallCustomComponents, &cluster.name).await
    }

    async fn create_eksa_resources(
        &self,
        cluster: &Cluster,
        _spec: &ClusterSpec,
        datacenter: &DatacenterConfig,
        _machines: &[MachineConfig],
    ) -> Result<()> {
        let target = format!("{} paused={}", cluster.name, datacenter.is_paused());
        self.0.enter(Call::CreateEksaResources, target).await
    }

    async fn resume_eksa_controller_reconcile(
        &self,
        cluster: &Cluster,
        _spec: &ClusterSpec,
        _provider: &dyn Provider,
    ) -> Result<()> {
        self.0
            .enter(Call::ResumeEksaControllerReconcile, &cluster.name)
            .await
    }

    async fn install_machine_health_checks(
        &self,
        cluster: &Cluster,
        _provider: &dyn Provider,
    ) -> Result<()> {
        self.0
            .enter(Call::InstallMachineHealthChecks, &cluster.name)
            .await
    }

    async fn save_logs(&self, cluster: Option<&Cluster>) -> Result<()> {
        self.0.enter(Call::SaveLogs, name_of(cluster)).await
    }
}

struct FakeAddonManager(Arc<CallLog>);

#[async_trait]
impl AddonManager for FakeAddonManager {
    async fn validations(&self, spec: &ClusterSpec) -> Result<()> {
        self.0.enter(Call::Validations, &spec.name).await
    }

    async fn install_gitops(
        &self,
        cluster: &Cluster,
        _spec: &ClusterSpec,
        _datacenter: &DatacenterConfig,
        _machines: &[MachineConfig],
    ) -> Result<()> {
        self.0.enter(Call::InstallGitOps, &cluster.name).await
    }

    async fn cleanup_git_repo(&self, spec: &ClusterSpec) -> Result<()> {
        self.0.enter(Call::CleanupGitRepo, &spec.name).await
    }
}

struct FakeWriter(Arc<CallLog>);

impl FileWriter for FakeWriter {
    fn write(&self, file_name: &str, _content: &[u8], _opts: &[WriteOption]) -> Result<PathBuf> {
        self.0.record(Call::Write, file_name)?;
        Ok(PathBuf::from(file_name))
    }
}
