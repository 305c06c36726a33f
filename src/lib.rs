//! clusterflow - task engine for bootstrap-driven Kubernetes cluster lifecycles
//!
//! Creating, upgrading and deleting a cluster all go through a temporary
//! bootstrap cluster that holds cluster-API management while the target
//! (workload) cluster is changed. Each of those workflows is a small graph of
//! named tasks with explicit success and compensation edges, interpreted by a
//! single runner.
//!
//! # Architecture
//!
//! - Tasks are fieldless enums with a static transition table, so every graph
//!   can be inspected and tested edge by edge
//! - All per-run state lives in one [`task::ExecutionContext`], owned by the run
//! - The first error of a run is the one reported; errors raised during
//!   compensation are kept as secondary errors and surfaced to the reporter
//! - Provider-specific work sits behind collaborator traits in [`interfaces`]
//!
//! # Modules
//!
//! - [`task`] - Task trait, runner, execution context, progress reporting
//! - [`workflows`] - Create, delete and upgrade workflows
//! - [`interfaces`] - Collaborator traits (bootstrapper, provider, cluster manager, ...)
//! - [`types`] - Cluster handles, cluster spec and provider config objects
//! - [`filewriter`] - Filesystem artifact writer
//! - [`config`] - Run configuration
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod filewriter;
pub mod interfaces;
pub mod task;
pub mod telemetry;
pub mod types;
pub mod workflows;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
