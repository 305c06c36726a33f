//! Workflow run configuration
//!
//! Loaded from a YAML file (`--config`), then adjusted from the environment.
//! Precedence, highest first:
//! 1. `CLUSTERFLOW_*` environment variables
//! 2. The config file
//! 3. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filewriter::FsWriter;
use crate::workflows::{WorkflowOptions, DEFAULT_CLEANUP_TIMEOUT};
use crate::{Error, Result};

const TIMEOUT_ENV: &str = "CLUSTERFLOW_TIMEOUT_SECS";
const CLEANUP_TIMEOUT_ENV: &str = "CLUSTERFLOW_CLEANUP_TIMEOUT_SECS";
const FORCE_CLEANUP_ENV: &str = "CLUSTERFLOW_FORCE_CLEANUP";
const LOG_FORMAT_ENV: &str = "CLUSTERFLOW_LOG_FORMAT";

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::config(format!(
                "unknown log format '{}' (expected text or json)",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Output format
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` still wins when set
    pub filter: Option<String>,
}

/// Configuration for a workflow run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Deadline for the forward part of a run, in seconds
    pub timeout_secs: Option<u64>,
    /// Window for cleanup tasks and log collection, in seconds
    pub cleanup_timeout_secs: u64,
    /// Delete a leftover bootstrap cluster before starting
    pub force_cleanup: bool,
    /// Where generated artifacts are written
    pub output_dir: PathBuf,
    /// Logging
    pub log: LogConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            cleanup_timeout_secs: DEFAULT_CLEANUP_TIMEOUT.as_secs(),
            force_cleanup: false,
            output_dir: PathBuf::from("."),
            log: LogConfig::default(),
        }
    }
}

impl WorkflowConfig {
    /// Parse a config from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse workflow config: {}", e)))
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Apply `CLUSTERFLOW_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(TIMEOUT_ENV).filter(|v| !v.is_empty()) {
            let secs = value.parse::<u64>().map_err(|e| {
                Error::config(format!("invalid {} '{}': {}", TIMEOUT_ENV, value, e))
            })?;
            self.timeout_secs = Some(secs);
        }

        if let Some(value) = lookup(CLEANUP_TIMEOUT_ENV).filter(|v| !v.is_empty()) {
            self.cleanup_timeout_secs = value.parse::<u64>().map_err(|e| {
                Error::config(format!("invalid {} '{}': {}", CLEANUP_TIMEOUT_ENV, value, e))
            })?;
        }

        if let Some(value) = lookup(FORCE_CLEANUP_ENV).filter(|v| !v.is_empty()) {
            self.force_cleanup = parse_bool(FORCE_CLEANUP_ENV, &value)?;
        }

        if let Some(value) = lookup(LOG_FORMAT_ENV).filter(|v| !v.is_empty()) {
            self.log.format = value.parse()?;
        }

        Ok(())
    }

    /// Run options for a workflow
    pub fn workflow_options(&self) -> WorkflowOptions {
        WorkflowOptions {
            force_cleanup: self.force_cleanup,
            timeout: self.timeout_secs.map(Duration::from_secs),
            cleanup_timeout: Some(Duration::from_secs(self.cleanup_timeout_secs)),
        }
    }

    /// Artifact writer rooted at `output_dir`
    pub fn file_writer(&self) -> FsWriter {
        FsWriter::new(&self.output_dir)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(Error::config(format!(
            "invalid {} '{}' (expected true or false)",
            key, value
        ))),
    }
}
