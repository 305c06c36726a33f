//! Collaborator capabilities consumed by workflows
//!
//! Each trait hides a provider-specific backend (vSphere, cloud, bare metal,
//! local docker). Workflows only ever hold these as `Arc<dyn Trait>` and never
//! branch on which backend is behind them.

use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::types::{
    BootstrapClusterOption, Cluster, ClusterSpec, DatacenterConfig, MachineConfig, MoveOption,
    WriteOption,
};
use crate::Result;

/// Lifecycle of the temporary bootstrap cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    /// Create the bootstrap cluster and return a handle to it
    async fn create_bootstrap_cluster(
        &self,
        spec: &ClusterSpec,
        opts: &[BootstrapClusterOption],
    ) -> Result<Cluster>;

    /// Delete the bootstrap cluster
    ///
    /// `keep_kind_cluster` leaves the underlying local cluster running while
    /// still releasing everything else the bootstrapper created.
    async fn delete_bootstrap_cluster(&self, cluster: &Cluster, keep_kind_cluster: bool)
        -> Result<()>;
}

/// Infrastructure provider backend
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name used as a label in logs (e.g. "vsphere")
    fn name(&self) -> &'static str;

    /// Validate credentials and inputs before a create
    async fn setup_and_validate_create_cluster(&self, spec: &ClusterSpec) -> Result<()>;

    /// Validate credentials before a delete
    async fn setup_and_validate_delete_cluster(&self) -> Result<()>;

    /// Validate credentials and inputs before an upgrade
    async fn setup_and_validate_upgrade_cluster(&self, spec: &ClusterSpec) -> Result<()>;

    /// Options this provider needs on the bootstrap cluster
    fn bootstrap_cluster_opts(&self) -> Result<Vec<BootstrapClusterOption>>;

    /// Provider-specific preparation of a freshly created bootstrap cluster
    async fn bootstrap_setup(&self, spec: &ClusterSpec, bootstrap: &Cluster) -> Result<()>;

    /// Release provider-level infrastructure left after the cluster is gone
    async fn cleanup_provider_infrastructure(&self) -> Result<()>;

    /// Current datacenter configuration object
    fn datacenter_config(&self) -> DatacenterConfig;

    /// Current machine configuration objects
    fn machine_configs(&self) -> Vec<MachineConfig>;
}

/// Cluster API operations against running clusters
///
/// Not automocked: several methods take `&dyn Provider`. Workflow tests use the
/// recording fakes in `workflows::testing` instead.
#[async_trait]
pub trait ClusterManager: Send + Sync {
    /// Install CAPI core and the provider's infrastructure components
    async fn install_capi(
        &self,
        spec: &ClusterSpec,
        cluster: &Cluster,
        provider: &dyn Provider,
    ) -> Result<()>;

    /// Create the workload cluster from the management cluster
    async fn create_workload_cluster(
        &self,
        management: &Cluster,
        spec: &ClusterSpec,
        provider: &dyn Provider,
    ) -> Result<Cluster>;

    /// Roll the workload cluster to the desired spec
    async fn upgrade_cluster(
        &self,
        management: &Cluster,
        workload: &Cluster,
        spec: &ClusterSpec,
        provider: &dyn Provider,
    ) -> Result<()>;

    /// Delete the workload cluster through the management cluster
    async fn delete_cluster(&self, management: &Cluster, workload: &Cluster) -> Result<()>;

    /// Install the CNI on a cluster
    async fn install_networking(&self, cluster: &Cluster, spec: &ClusterSpec) -> Result<()>;

    /// Install the provider's default storage class
    async fn install_storage_class(&self, cluster: &Cluster, provider: &dyn Provider)
        -> Result<()>;

    /// Move CAPI resources from one cluster to another
    async fn move_capi(&self, from: &Cluster, to: &Cluster, opts: &[MoveOption]) -> Result<()>;

    /// Install the cluster controller and its CRDs
    async fn install_custom_components(&self, spec: &ClusterSpec, cluster: &Cluster)
        -> Result<()>;

    /// Create the cluster's own resources on the cluster
    async fn create_eksa_resources(
        &self,
        cluster: &Cluster,
        spec: &ClusterSpec,
        datacenter: &DatacenterConfig,
        machines: &[MachineConfig],
    ) -> Result<()>;

    /// Let the cluster controller resume reconciling the cluster's resources
    async fn resume_eksa_controller_reconcile(
        &self,
        cluster: &Cluster,
        spec: &ClusterSpec,
        provider: &dyn Provider,
    ) -> Result<()>;

    /// Install machine health checks
    async fn install_machine_health_checks(
        &self,
        cluster: &Cluster,
        provider: &dyn Provider,
    ) -> Result<()>;

    /// Collect diagnostic logs, from the given cluster when one exists
    async fn save_logs(&self, cluster: Option<&Cluster>) -> Result<()>;
}

/// GitOps add-on management
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AddonManager: Send + Sync {
    /// Validate add-on configuration before anything is created
    async fn validations(&self, spec: &ClusterSpec) -> Result<()>;

    /// Install GitOps tooling and commit the cluster's configuration
    async fn install_gitops(
        &self,
        cluster: &Cluster,
        spec: &ClusterSpec,
        datacenter: &DatacenterConfig,
        machines: &[MachineConfig],
    ) -> Result<()>;

    /// Remove the cluster's entry from the GitOps repository
    async fn cleanup_git_repo(&self, spec: &ClusterSpec) -> Result<()>;
}

/// Artifact persistence
#[cfg_attr(test, automock)]
pub trait FileWriter: Send + Sync {
    /// Write `content` under `file_name` and return where it landed
    fn write(&self, file_name: &str, content: &[u8], opts: &[WriteOption]) -> Result<PathBuf>;
}
