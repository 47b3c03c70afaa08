//! Launcher home setup and path layout.
//!
//! Ensures ~/.app-book exists with the apps directory and logs directory.
//! The path can be overridden via the APP_BOOK_PATH environment variable.
//! Idempotent: nothing the user owns is ever overwritten.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

/// Environment variable to override the default ~/.app-book path
pub const APP_BOOK_PATH_ENV: &str = "APP_BOOK_PATH";

const APPS_DIR: &str = "apps";
const LOGS_DIR: &str = "logs";
const VENV_DIR: &str = "venv";
const SETTINGS_FILE: &str = "launcher_config.json";
const INSTALL_LOG_FILE: &str = "installed_modules.log";
const VENV_LOCK_FILE: &str = "venv.lock";

/// Every location the launcher reads or writes, derived from one home directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherPaths {
    pub home: PathBuf,
}

impl LauncherPaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Paths rooted at [`get_launcher_path`]
    pub fn from_env() -> Self {
        Self::new(get_launcher_path())
    }

    /// Directory scanned for `*.app` descriptors
    pub fn apps_dir(&self) -> PathBuf {
        self.home.join(APPS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home.join(LOGS_DIR)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.home.join(SETTINGS_FILE)
    }

    /// Append-only record of installs, one line per session
    pub fn install_log(&self) -> PathBuf {
        self.home.join(INSTALL_LOG_FILE)
    }

    /// Root of the isolated interpreter environment
    pub fn venv_root(&self) -> PathBuf {
        self.home.join(VENV_DIR)
    }

    /// Lock file serialising environment provisioning across processes
    pub fn venv_lock(&self) -> PathBuf {
        self.home.join(VENV_LOCK_FILE)
    }
}

/// Result of setup process
#[derive(Debug)]
pub struct SetupResult {
    /// Whether the launcher home didn't exist before this run
    pub is_fresh_install: bool,
    pub paths: LauncherPaths,
    /// Any warnings encountered during setup
    pub warnings: Vec<String>,
}

/// Get the launcher home, respecting APP_BOOK_PATH
///
/// Priority:
/// 1. APP_BOOK_PATH environment variable (if set)
/// 2. ~/.app-book (default)
/// 3. Temp directory fallback (if home dir unavailable)
pub fn get_launcher_path() -> PathBuf {
    if let Ok(override_path) = std::env::var(APP_BOOK_PATH_ENV) {
        return PathBuf::from(shellexpand::tilde(&override_path).as_ref());
    }

    match dirs::home_dir() {
        Some(home) => home.join(".app-book"),
        None => std::env::temp_dir().join("app-book"),
    }
}

/// Create the launcher home and its required directories.
///
/// Failures are collected as warnings; the launcher still starts so the
/// user can see what went wrong.
#[instrument(level = "info", skip_all, fields(home = %paths.home.display()))]
pub fn ensure_launcher_setup(paths: &LauncherPaths) -> SetupResult {
    let mut warnings = Vec::new();
    let is_fresh_install = !paths.home.exists();

    if std::env::var(APP_BOOK_PATH_ENV).is_ok() {
        info!(home = %paths.home.display(), "Using APP_BOOK_PATH override");
    }

    for dir in [paths.home.clone(), paths.apps_dir(), paths.logs_dir()] {
        ensure_dir(&dir, &mut warnings);
    }

    info!(
        is_fresh_install,
        warning_count = warnings.len(),
        "Launcher setup complete"
    );

    SetupResult {
        is_fresh_install,
        paths: paths.clone(),
        warnings,
    }
}

fn ensure_dir(path: &Path, warnings: &mut Vec<String>) {
    if path.exists() {
        return;
    }
    if let Err(e) = fs::create_dir_all(path) {
        warnings.push(format!(
            "Failed to create directory {}: {}",
            path.display(),
            e
        ));
    } else {
        debug!(path = %path.display(), "Created directory");
    }
}
