//! Error types for clusterflow workflows

use thiserror::Error;

/// Main error type for workflow operations
///
/// Payloads are plain strings so a run's first failure can be kept in the
/// execution context and handed back to the caller by value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// Pre-flight validation failed before any resource was touched
    #[error("validation error: {0}")]
    Validation(String),

    /// Infrastructure provider error
    #[error("provider error: {0}")]
    Provider(String),

    /// Bootstrap cluster lifecycle error
    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    /// Cluster management error (CAPI install, move, workload create/delete)
    #[error("cluster management error: {0}")]
    ClusterManagement(String),

    /// Add-on / GitOps error
    #[error("addon error: {0}")]
    Addon(String),

    /// Artifact write error
    #[error("write error: {0}")]
    Write(String),

    /// Configuration loading or parsing error
    #[error("config error: {0}")]
    Config(String),

    /// A task needed a cluster handle that no earlier task recorded
    #[error("missing {0} cluster handle")]
    MissingHandle(String),

    /// The run was cancelled while the named task was in flight
    #[error("cancelled during {0}")]
    Cancelled(String),

    /// The run deadline passed while the named task was in flight
    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(String),

    /// The task graph ended without error but outside its terminal task
    #[error("workflow stopped after {0} without completing")]
    Incomplete(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a provider error with the given message
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a bootstrap error with the given message
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::Bootstrap(msg.into())
    }

    /// Create a cluster management error with the given message
    pub fn cluster_management(msg: impl Into<String>) -> Self {
        Self::ClusterManagement(msg.into())
    }

    /// Create an addon error with the given message
    pub fn addon(msg: impl Into<String>) -> Self {
        Self::Addon(msg.into())
    }

    /// Create a write error with the given message
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Create a config error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing-handle error for the named cluster role
    pub fn missing_handle(role: impl Into<String>) -> Self {
        Self::MissingHandle(role.into())
    }

    /// True for pre-flight failures raised before anything was provisioned
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True when the run was interrupted rather than failing on its own
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled(_) | Self::DeadlineExceeded(_))
    }
}
