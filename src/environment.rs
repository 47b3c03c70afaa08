//! Isolated interpreter environment
//!
//! The environment is a Python virtual environment created once per
//! machine under the launcher home. Existence of the root directory is the
//! only health check: if the root exists the interpreter is assumed valid.
//!
//! The check and the provisioning both run under an exclusive lock on a
//! sibling lock file, so two launches racing on first run provision
//! exactly once and neither sees a half-built environment.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use fs2::FileExt;
use tracing::{debug, info, instrument, warn};

use crate::error::{LauncherError, Result, ResultExt};

/// Handle to the isolated environment rooted at `root`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedEnvironment {
    root: PathBuf,
    lock_path: PathBuf,
    /// Interpreter used to create the environment (the user's `python_path`)
    base_python: String,
}

impl IsolatedEnvironment {
    pub fn new(root: impl Into<PathBuf>, lock_path: impl Into<PathBuf>, base_python: &str) -> Self {
        Self {
            root: root.into(),
            lock_path: lock_path.into(),
            base_python: base_python.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Interpreter binary inside the environment
    pub fn interpreter_path(&self) -> PathBuf {
        interpreter_path_for(&self.root)
    }

    /// Create the environment if its root is absent.
    ///
    /// Returns `true` when this call provisioned it and `false` when it
    /// already existed. A provisioning failure leaves no root behind.
    #[instrument(level = "info", skip_all, fields(root = %self.root.display()))]
    pub fn ensure_environment(&self) -> Result<bool> {
        // The root appears on disk before provisioning finishes, so the
        // existence check is only meaningful while holding the lock.
        let lock_file = self.acquire_lock()?;

        let created = if self.root.exists() {
            debug!("Virtual environment found");
            Ok(false)
        } else {
            self.provision().map(|()| true)
        };

        lock_file.unlock().warn_on_err();
        created
    }

    fn acquire_lock(&self) -> Result<fs::File> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.provisioning_error(e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| self.provisioning_error(format!("cannot open lock file: {}", e)))?;
        file.lock_exclusive()
            .map_err(|e| self.provisioning_error(format!("cannot lock: {}", e)))?;
        Ok(file)
    }

    fn provision(&self) -> Result<()> {
        let start = Instant::now();
        info!(base_python = %self.base_python, "Creating virtual environment");

        fs::create_dir_all(&self.root).map_err(|e| self.provisioning_error(e))?;

        let output = Command::new(&self.base_python)
            .arg("-m")
            .arg("venv")
            .arg(&self.root)
            .stdin(Stdio::null())
            .output();

        let failure = match output {
            Ok(output) if output.status.success() => None,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                Some(if stderr.is_empty() {
                    format!("'{} -m venv' exited with {}", self.base_python, output.status)
                } else {
                    stderr
                })
            }
            Err(e) => Some(format!("cannot run '{}': {}", self.base_python, e)),
        };

        if let Some(message) = failure {
            warn!(error = %message, "Virtual environment provisioning failed");
            // Keep "root exists => interpreter valid" true for the next run
            fs::remove_dir_all(&self.root).warn_on_err();
            return Err(self.provisioning_error(message));
        }

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            interpreter = %self.interpreter_path().display(),
            "Virtual environment created"
        );
        Ok(())
    }

    fn provisioning_error(&self, message: impl std::fmt::Display) -> LauncherError {
        LauncherError::EnvironmentProvisioning {
            root: self.root.display().to_string(),
            message: message.to_string(),
        }
    }
}

/// Platform layout of a virtual environment's interpreter
pub fn interpreter_path_for(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join("Scripts").join("python.exe")
    } else {
        root.join("bin").join("python")
    }
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
