//! Domain types shared by workflows and collaborators
//!
//! These are the values that flow between tasks: the immutable [`ClusterSpec`]
//! describing the desired cluster, [`Cluster`] handles for clusters that exist
//! at a given point of a run, and the provider-owned datacenter and machine
//! configuration objects.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Annotation that tells the cluster controller to stop reconciling an object
pub const PAUSED_ANNOTATION: &str = "anywhere.eks.amazonaws.com/paused";

/// Maximum length of a cluster name (RFC 1123 label)
const MAX_CLUSTER_NAME_LEN: usize = 63;

/// Handle to a cluster that exists at some point of a run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Cluster name
    pub name: String,
    /// Kubeconfig used to reach the cluster, when one has been written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
}

impl Cluster {
    /// Create a handle carrying only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kubeconfig: None,
        }
    }

    /// Attach the kubeconfig path used to reach this cluster
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }
}

/// GitOps add-on configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsConfig {
    /// Repository holding the cluster's add-on manifests
    pub repository: String,
    /// Branch to reconcile from
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Path inside the repository for this cluster's configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_config_path: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Desired cluster description
///
/// Read-only for the whole run; tasks only ever see it by shared reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Cluster name, also used for the bootstrap cluster on force cleanup
    pub name: String,
    /// Kubernetes version (e.g. "1.31")
    pub kubernetes_version: String,
    /// Number of control plane nodes
    #[serde(default = "default_control_plane_count")]
    pub control_plane_count: u32,
    /// Number of worker nodes
    #[serde(default)]
    pub worker_count: u32,
    /// Kind of datacenter configuration the provider manages (e.g. "VSphereDatacenterConfig")
    pub datacenter_kind: String,
    /// Optional GitOps add-on configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitops: Option<GitOpsConfig>,
    /// Free-form annotations carried into the written cluster config
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

fn default_control_plane_count() -> u32 {
    1
}

impl ClusterSpec {
    /// Create a spec with defaults for everything but name, version and datacenter kind
    pub fn new(
        name: impl Into<String>,
        kubernetes_version: impl Into<String>,
        datacenter_kind: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kubernetes_version: kubernetes_version.into(),
            control_plane_count: default_control_plane_count(),
            worker_count: 0,
            datacenter_kind: datacenter_kind.into(),
            gitops: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Parse and validate a spec from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        let spec: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse cluster spec: {}", e)))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Read, parse and validate a spec file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Validate the spec
    pub fn validate(&self) -> Result<()> {
        validate_cluster_name(&self.name)?;

        if self.kubernetes_version.trim().is_empty() {
            return Err(Error::validation("kubernetes version must be set"));
        }

        if self.control_plane_count == 0 {
            return Err(Error::validation("control plane count must be at least 1"));
        }

        if self.control_plane_count % 2 == 0 {
            return Err(Error::validation(
                "control plane count must be odd for HA (1, 3, 5, ...)",
            ));
        }

        if self.datacenter_kind.trim().is_empty() {
            return Err(Error::validation("datacenter kind must be set"));
        }

        if let Some(gitops) = &self.gitops {
            if gitops.repository.trim().is_empty() {
                return Err(Error::validation(
                    "gitops repository must be set when gitops is configured",
                ));
            }
        }

        Ok(())
    }

    /// File name the generated cluster configuration is written to
    pub fn config_file_name(&self) -> String {
        format!("{}-eks-a-cluster.yaml", self.name)
    }
}

/// Check a cluster name against RFC 1123 label rules
fn validate_cluster_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("cluster name must be set"));
    }
    if name.len() > MAX_CLUSTER_NAME_LEN {
        return Err(Error::validation(format!(
            "cluster name '{}' is longer than {} characters",
            name, MAX_CLUSTER_NAME_LEN
        )));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = !name.starts_with('-') && !name.ends_with('-');
    if !valid_chars || !valid_edges {
        return Err(Error::validation(format!(
            "cluster name '{}' is not a valid DNS label",
            name
        )));
    }
    Ok(())
}

/// Provider-owned datacenter configuration object
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterConfig {
    /// Resource kind (e.g. "VSphereDatacenterConfig")
    pub kind: String,
    /// Resource name
    pub name: String,
    /// Resource annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Provider-specific spec (untyped)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
}

impl DatacenterConfig {
    /// Create a datacenter config with no annotations or spec
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            annotations: BTreeMap::new(),
            spec: None,
        }
    }

    /// Mark the object paused so controllers leave it alone while it is created
    pub fn pause_reconcile(&mut self) {
        self.annotations
            .insert(PAUSED_ANNOTATION.to_string(), "true".to_string());
    }

    /// Whether reconcile is paused on this object
    pub fn is_paused(&self) -> bool {
        self.annotations
            .get(PAUSED_ANNOTATION)
            .is_some_and(|v| v == "true")
    }
}

/// Provider-owned machine configuration object
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfig {
    /// Resource kind (e.g. "VSphereMachineConfig")
    pub kind: String,
    /// Resource name
    pub name: String,
    /// Provider-specific spec (untyped)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
}

impl MachineConfig {
    /// Create a machine config with no spec
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            spec: None,
        }
    }
}

/// Options a provider asks for when the bootstrap cluster is created
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootstrapClusterOption {
    /// Skip the bootstrap cluster's default CNI
    DefaultCniDisabled,
    /// Mount the host docker socket into bootstrap nodes
    ExtraDockerMounts,
    /// Expose container ports on the host
    ExtraPortMappings(Vec<u16>),
    /// Extra environment passed to bootstrap tooling
    Env(String, String),
}

/// Conditions a management move waits for on the target cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOption {
    /// Wait until every Machine has a NodeRef
    WaitForNodeRef,
    /// Wait until every node reports healthy
    WaitForNodesHealthy,
}

/// Options for artifact writes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOption {
    /// Keep the file after the run instead of placing it with temporary output
    Persistent,
    /// Unix permission bits for the written file
    Permission(u32),
}
