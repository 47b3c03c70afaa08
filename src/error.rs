use thiserror::Error;
use tracing::{error, warn};

/// Error severity for front-end display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,     // informational
    Warning,  // recoverable
    Error,    // operation failed
    Critical, // no usable environment, requires user action
}

/// Domain-specific errors for the launcher
#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Failed to provision isolated environment at '{root}': {message}")]
    EnvironmentProvisioning { root: String, message: String },

    #[error("Package installation failed for [{modules}]: {message}")]
    Installation { modules: String, message: String },

    #[error("Failed to launch '{script}': {source}")]
    Launch {
        script: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage error for '{path}': {message}")]
    Storage { path: String, message: String },

    #[error("No app named '{0}'")]
    AppNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LauncherError {
    pub fn storage(path: impl AsRef<std::path::Path>, message: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::EnvironmentProvisioning { .. } => ErrorSeverity::Critical,
            Self::Installation { .. } => ErrorSeverity::Error,
            Self::Launch { .. } => ErrorSeverity::Error,
            Self::Storage { .. } => ErrorSeverity::Warning,
            Self::AppNotFound(_) => ErrorSeverity::Info,
            Self::Config(_) => ErrorSeverity::Warning,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::EnvironmentProvisioning { message, .. } => {
                format!("No usable virtual environment: {}", message)
            }
            Self::Installation { modules, .. } => {
                format!("Could not install {}. Nothing was recorded.", modules)
            }
            Self::Launch { script, source } => format!("Could not start {}: {}", script, source),
            Self::Storage { path, message } => format!("Could not access {}: {}", path, message),
            Self::AppNotFound(name) => format!("No app named '{}' is installed", name),
            Self::Config(msg) => format!("Configuration issue: {}", msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the user doesn't need to know.
///
/// # Examples
///
/// ```ignore
/// use app_book::error::ResultExt;
///
/// let removed = std::fs::remove_file(&entry).warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
