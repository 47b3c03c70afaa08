//! Configuration type definitions

use serde::{Deserialize, Serialize};

use super::defaults::*;

/// Persisted launcher settings.
///
/// Field names are snake_case on disk. Every field falls back to its
/// default when absent so older settings files keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_run_on_startup")]
    pub run_on_startup: bool,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    /// Interpreter used to create the isolated environment
    #[serde(default = "default_python_path")]
    pub python_path: String,
    /// Never invoke the package installer; only report missing modules
    #[serde(default = "default_offline_mode")]
    pub offline_mode: bool,
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_run_on_startup() -> bool {
    DEFAULT_RUN_ON_STARTUP
}
fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}
fn default_offline_mode() -> bool {
    DEFAULT_OFFLINE_MODE
}
fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            run_on_startup: DEFAULT_RUN_ON_STARTUP,
            font_size: DEFAULT_FONT_SIZE,
            python_path: default_python_path(),
            offline_mode: DEFAULT_OFFLINE_MODE,
            theme: DEFAULT_THEME.to_string(),
        }
    }
}

impl Settings {
    /// The policy handed to dependency resolution.
    ///
    /// Always derived from the settings value the caller holds; there is
    /// no process-wide fallback.
    pub fn policy(&self) -> ResolutionPolicy {
        ResolutionPolicy {
            offline_mode: self.offline_mode,
        }
    }
}

/// How missing modules are handled during a validation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionPolicy {
    pub offline_mode: bool,
}
