//! Filesystem-backed artifact writer
//!
//! Persistent artifacts (the generated cluster config) land directly in the
//! output directory. Everything else goes under `generated/`, which is removed
//! once a run no longer needs it.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::interfaces::FileWriter;
use crate::types::WriteOption;
use crate::{Error, Result};

/// Subdirectory for non-persistent artifacts
pub const TEMP_DIR_NAME: &str = "generated";

/// Writes artifacts beneath an output directory
#[derive(Clone, Debug)]
pub struct FsWriter {
    dir: PathBuf,
}

impl FsWriter {
    /// Create a writer rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding non-persistent artifacts
    pub fn temp_dir(&self) -> PathBuf {
        self.dir.join(TEMP_DIR_NAME)
    }

    /// Remove every non-persistent artifact
    pub fn clean_up_temp(&self) -> Result<()> {
        let temp = self.temp_dir();
        if !temp.exists() {
            return Ok(());
        }
        std::fs::remove_dir_all(&temp).map_err(|e| {
            Error::write(format!("failed to remove {}: {}", temp.display(), e))
        })?;
        debug!(dir = %temp.display(), "removed temporary artifacts");
        Ok(())
    }
}

impl FileWriter for FsWriter {
    fn write(&self, file_name: &str, content: &[u8], opts: &[WriteOption]) -> Result<PathBuf> {
        if file_name.trim().is_empty() {
            return Err(Error::write("file name must not be empty"));
        }
        let relative = Path::new(file_name);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(Error::write(format!(
                "file name '{}' must be relative and stay inside the output directory",
                file_name
            )));
        }

        let persistent = opts.contains(&WriteOption::Persistent);
        let target_dir = if persistent {
            self.dir.clone()
        } else {
            self.temp_dir()
        };

        let path = target_dir.join(relative);
        let parent = path.parent().unwrap_or(target_dir.as_path());
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::write(format!(
                "failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;

        std::fs::write(&path, content)
            .map_err(|e| Error::write(format!("failed to write {}: {}", path.display(), e)))?;

        for opt in opts {
            if let WriteOption::Permission(mode) = opt {
                set_mode(&path, *mode)?;
            }
        }

        debug!(path = %path.display(), persistent, "wrote artifact");
        Ok(path)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        Error::write(format!(
            "failed to set mode {:o} on {}: {}",
            mode,
            path.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
