//! App discovery, search and installation
//!
//! Apps are `*.app` files in a single directory. The registry is rebuilt
//! from disk on every call; nothing is cached between scans.

use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use tracing::{debug, info, instrument, warn};

use crate::error::{LauncherError, Result};
use crate::metadata::read_metadata;

pub use crate::metadata::AppDescriptor;

/// File extension that marks a launchable app
pub const APP_EXTENSION: &str = "app";

/// Scan `apps_dir` for `*.app` files and return their descriptors sorted by
/// name (then path). A missing directory yields an empty list; files that
/// cannot be read are skipped.
#[instrument(level = "debug", skip_all, fields(apps_dir = %apps_dir.display()))]
pub fn list_apps(apps_dir: &Path) -> Vec<AppDescriptor> {
    let dir_pattern = glob::Pattern::escape(&apps_dir.to_string_lossy());
    let pattern = format!("{}/*.{}", dir_pattern, APP_EXTENSION);

    let paths: Vec<PathBuf> = match glob(&pattern) {
        Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
        Err(e) => {
            warn!(error = %e, pattern = %pattern, "Failed to glob apps directory");
            return vec![];
        }
    };

    let mut apps: Vec<AppDescriptor> = paths
        .into_iter()
        .filter(|path| path.is_file())
        .filter_map(|path| match read_metadata(&path) {
            Ok(app) => Some(app),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Skipping unreadable app");
                None
            }
        })
        .collect();

    apps.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));

    debug!(count = apps.len(), "Loaded apps");
    apps
}

/// Find an app by display name (case-insensitive) or by file stem
pub fn find_app<'a>(apps: &'a [AppDescriptor], query: &str) -> Option<&'a AppDescriptor> {
    let query_lower = query.to_lowercase();
    apps.iter()
        .find(|app| app.name.to_lowercase() == query_lower)
        .or_else(|| {
            apps.iter().find(|app| {
                app.path
                    .file_stem()
                    .is_some_and(|stem| stem.to_string_lossy().to_lowercase() == query_lower)
            })
        })
}

/// Keep apps whose name, description or category contains `term`,
/// case-insensitively. An empty term keeps everything.
pub fn filter_apps(apps: &[AppDescriptor], term: &str) -> Vec<AppDescriptor> {
    let term_lower = term.trim().to_lowercase();
    if term_lower.is_empty() {
        return apps.to_vec();
    }

    apps.iter()
        .filter(|app| {
            app.name.to_lowercase().contains(&term_lower)
                || app.description.to_lowercase().contains(&term_lower)
                || app.category.to_lowercase().contains(&term_lower)
        })
        .cloned()
        .collect()
}

/// Copy an app bundle into `apps_dir`, keeping its file name.
///
/// Returns the installed path. An existing app with the same file name is
/// replaced.
#[instrument(level = "info", skip_all, fields(source = %source.display()))]
pub fn install_app(source: &Path, apps_dir: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(LauncherError::storage(source, "file not found"));
    }

    let is_app = source
        .extension()
        .is_some_and(|ext| ext == APP_EXTENSION);
    if !is_app {
        return Err(LauncherError::storage(
            source,
            format!("expected a .{} file", APP_EXTENSION),
        ));
    }

    let file_name = source
        .file_name()
        .ok_or_else(|| LauncherError::storage(source, "path has no file name"))?;

    fs::create_dir_all(apps_dir).map_err(|e| LauncherError::storage(apps_dir, e))?;
    let dest = apps_dir.join(file_name);
    fs::copy(source, &dest).map_err(|e| LauncherError::storage(&dest, e))?;

    info!(dest = %dest.display(), "Installed app");
    Ok(dest)
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
