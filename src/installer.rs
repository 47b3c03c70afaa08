//! Installation mediator
//!
//! Reconciles a script's requirements against the isolated environment:
//! probe everything, and when something is missing either warn (offline)
//! or ask the user and install the whole batch with pip.
//!
//! ## Flow
//!
//! 1. Probe each distinct requirement, keeping first-occurrence order
//! 2. Nothing missing: return an empty outcome, no prompt, no installer
//! 3. Offline: report the missing list, return it, never install
//! 4. Online: ask; on "yes" run one `pip install` with every missing name
//!    and append one line to the install log
//!
//! A failed install is atomic: nothing is logged and the error propagates.
//! The next pass re-probes and offers the whole remaining batch again.
//! A successful install whose log line cannot be written is still reported
//! as installed; the write failure is only logged.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::config::ResolutionPolicy;
use crate::error::{LauncherError, Result, ResultExt};
use crate::resolver::{ModuleProbe, ModuleStatus};

/// Prefix of each install log record
pub const INSTALL_LOG_PREFIX: &str = "Installed for session: ";

/// Result of one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionOutcome {
    /// Distinct requirements that were not importable, in source order
    pub missing: Vec<String>,
    /// Modules installed during this pass
    pub installed: Vec<String>,
}

impl ResolutionOutcome {
    /// Every requirement is importable now
    pub fn is_satisfied(&self) -> bool {
        self.missing.len() == self.installed.len()
    }
}

/// Installs a batch of modules into the environment
pub trait PackageInstaller {
    fn install(&self, interpreter: &Path, modules: &[String]) -> Result<()>;
}

/// User interaction needed while resolving
pub trait InstallPrompt {
    /// Ask whether `missing` should be installed
    fn confirm_install(&self, missing: &[String]) -> bool;
    /// Tell the user `missing` cannot be installed in offline mode
    fn report_offline_missing(&self, missing: &[String]);
}

/// Runs `<interpreter> -m pip install <names...>`
#[derive(Debug, Clone, Copy, Default)]
pub struct PipInstaller;

impl PackageInstaller for PipInstaller {
    #[instrument(level = "info", skip_all, fields(modules = %modules.join(",")))]
    fn install(&self, interpreter: &Path, modules: &[String]) -> Result<()> {
        let start = Instant::now();
        let output = Command::new(interpreter)
            .args(["-m", "pip", "install"])
            .args(modules)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| LauncherError::Installation {
                modules: modules.join(", "),
                message: format!("cannot run pip: {}", e),
            })?;

        debug!(stdout = %String::from_utf8_lossy(&output.stdout), "pip output");

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = last_lines(&stderr, 5);
            warn!(status = %output.status, error = %message, "pip install failed");
            return Err(LauncherError::Installation {
                modules: modules.join(", "),
                message: if message.is_empty() {
                    format!("pip exited with {}", output.status)
                } else {
                    message
                },
            });
        }

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "pip install succeeded"
        );
        Ok(())
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Decides what to do about missing modules for one validation pass
pub struct InstallMediator<'a> {
    probe: &'a dyn ModuleProbe,
    installer: &'a dyn PackageInstaller,
    prompt: &'a dyn InstallPrompt,
    install_log: PathBuf,
}

impl<'a> InstallMediator<'a> {
    pub fn new(
        probe: &'a dyn ModuleProbe,
        installer: &'a dyn PackageInstaller,
        prompt: &'a dyn InstallPrompt,
        install_log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            probe,
            installer,
            prompt,
            install_log: install_log.into(),
        }
    }

    #[instrument(level = "info", skip_all, fields(offline = policy.offline_mode))]
    pub fn resolve(
        &self,
        requirements: &[String],
        interpreter: &Path,
        policy: ResolutionPolicy,
    ) -> Result<ResolutionOutcome> {
        let distinct = dedup_preserving_order(requirements);
        let statuses = self.probe.probe_all(&distinct, interpreter);

        let missing: Vec<String> = distinct
            .into_iter()
            .zip(statuses)
            .filter(|(_, status)| *status == ModuleStatus::Absent)
            .map(|(name, _)| name)
            .collect();

        if missing.is_empty() {
            debug!("All requirements present");
            return Ok(ResolutionOutcome::default());
        }

        info!(missing = %missing.join(","), "Missing modules");

        if policy.offline_mode {
            self.prompt.report_offline_missing(&missing);
            return Ok(ResolutionOutcome {
                missing,
                installed: Vec::new(),
            });
        }

        if !self.prompt.confirm_install(&missing) {
            info!("User declined install");
            return Ok(ResolutionOutcome {
                missing,
                installed: Vec::new(),
            });
        }

        self.installer.install(interpreter, &missing)?;
        // install log is best effort once pip has succeeded
        self.record_install(&missing).warn_on_err();

        Ok(ResolutionOutcome {
            installed: missing.clone(),
            missing,
        })
    }

    fn record_install(&self, installed: &[String]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.install_log)
            .map_err(|e| LauncherError::storage(&self.install_log, e))?;
        writeln!(file, "{}{}", INSTALL_LOG_PREFIX, installed.join(", "))
            .map_err(|e| LauncherError::storage(&self.install_log, e))?;
        Ok(())
    }
}

fn dedup_preserving_order(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
#[path = "installer_tests.rs"]
mod tests;
