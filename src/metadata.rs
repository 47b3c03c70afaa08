//! Header metadata reader for `.app` scripts
//!
//! An app describes itself in a block of comment lines at the very top of
//! the file:
//!
//! ```text
//! # Name: Disk Report
//! # Description: Summarise free space on every mount
//! # Version: 1.2
//! # Category: System
//! # Icon: 💾
//! # Args: paths to include
//! import shutil
//! ```
//!
//! Scanning stops at the first line that does not start with `#`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{LauncherError, Result};

pub const DEFAULT_DESCRIPTION: &str = "No description";
pub const DEFAULT_VERSION: &str = "0.1";
pub const DEFAULT_CATEGORY: &str = "Utility";
pub const DEFAULT_ICON: &str = "🚟";

static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*(\w+):\s*(.+)").expect("header regex is valid"));

/// A launchable app discovered in the apps directory. Identity is `path`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppDescriptor {
    pub name: String,
    pub description: String,
    pub version: String,
    pub category: String,
    pub icon: String,
    pub path: PathBuf,
    /// The header declared an `Args` line; the front end asks for arguments
    pub takes_args: bool,
    /// Header keys with no dedicated field, lower-cased
    pub extra: BTreeMap<String, String>,
}

impl AppDescriptor {
    /// Descriptor with every field defaulted for `path`
    pub fn with_defaults(path: &Path) -> Self {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            name,
            description: DEFAULT_DESCRIPTION.to_string(),
            version: DEFAULT_VERSION.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            icon: DEFAULT_ICON.to_string(),
            path: path.to_path_buf(),
            takes_args: false,
            extra: BTreeMap::new(),
        }
    }

    /// One-line label for list display: `<icon> <name> (<category>)`
    pub fn list_label(&self) -> String {
        format!("{} {} ({})", self.icon, self.name, self.category)
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "name" => self.name = value.to_string(),
            "description" => self.description = value.to_string(),
            "version" => self.version = value.to_string(),
            "category" => self.category = value.to_string(),
            "icon" => self.icon = value.to_string(),
            "args" => {
                self.takes_args = true;
                self.extra.insert(key.to_string(), value.to_string());
            }
            _ => {
                self.extra.insert(key.to_string(), value.to_string());
            }
        }
    }
}

/// Parse a header line into `(lowercased_key, trimmed_value)`
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let caps = HEADER_LINE.captures(line)?;
    let key = caps.get(1)?.as_str().to_lowercase();
    let value = caps.get(2)?.as_str().trim().to_string();
    if value.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Build a descriptor for `path` from already-loaded `content`
pub fn parse_metadata(path: &Path, content: &str) -> AppDescriptor {
    let mut descriptor = AppDescriptor::with_defaults(path);

    for line in content.lines() {
        if !line.starts_with('#') {
            break;
        }
        if let Some((key, value)) = parse_header_line(line) {
            descriptor.apply(&key, &value);
        }
    }

    debug!(
        path = %path.display(),
        name = %descriptor.name,
        takes_args = descriptor.takes_args,
        "Parsed app metadata"
    );
    descriptor
}

/// Read `path` and parse its header block
pub fn read_metadata(path: &Path) -> Result<AppDescriptor> {
    let content = std::fs::read_to_string(path).map_err(|e| LauncherError::storage(path, e))?;
    Ok(parse_metadata(path, &content))
}
