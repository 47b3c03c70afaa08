//! Settings loading and saving
//!
//! Settings live in a pretty-printed JSON file. A missing file means
//! defaults; anything else that goes wrong is a storage error so callers
//! can keep their previous in-memory settings.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, instrument, warn};

use super::types::Settings;
use crate::error::{LauncherError, Result};

/// Load settings from `path`, returning defaults when the file does not exist
#[instrument(name = "load_settings", skip_all, fields(path = %path.display()))]
pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Settings file not found, using defaults");
            return Ok(Settings::default());
        }
        Err(e) => {
            warn!(error = %e, "Failed to read settings file");
            return Err(LauncherError::storage(path, e));
        }
    };

    serde_json::from_str::<Settings>(&content).map_err(|e| {
        warn!(error = %e, "Failed to parse settings JSON");
        LauncherError::storage(path, format!("invalid settings JSON: {}", e))
    })
}

/// Write settings to `path` atomically (temp file then rename)
#[instrument(name = "save_settings", skip_all, fields(path = %path.display()))]
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| LauncherError::storage(path, e))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| LauncherError::storage(parent, e))?;
    }

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json).map_err(|e| LauncherError::storage(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| LauncherError::storage(path, e))?;

    info!(
        offline_mode = settings.offline_mode,
        run_on_startup = settings.run_on_startup,
        "Settings saved"
    );
    Ok(())
}

/// Load, change and save settings in one step.
///
/// Nothing is written when the current file cannot be loaded, so a damaged
/// file is never replaced by defaults. Returns `(previous, updated)`.
pub fn update_settings(
    path: &Path,
    change: impl FnOnce(&mut Settings),
) -> Result<(Settings, Settings)> {
    let previous = load_settings(path)?;
    let mut updated = previous.clone();
    change(&mut updated);
    if updated != previous {
        save_settings(path, &updated)?;
    }
    Ok((previous, updated))
}

/// Settings for a launch or environment check.
///
/// An unreadable file yields defaults with offline mode forced on, so a
/// damaged file can never turn installs back on. The load error is handed
/// back for the caller to show.
pub fn load_settings_for_launch(path: &Path) -> (Settings, Option<LauncherError>) {
    match load_settings(path) {
        Ok(settings) => (settings, None),
        Err(e) => {
            warn!(error = %e, "Settings unreadable, launching offline with defaults");
            let settings = Settings {
                offline_mode: true,
                ..Settings::default()
            };
            (settings, Some(e))
        }
    }
}
