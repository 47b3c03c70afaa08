//! Configuration module - Launcher settings and user preferences
//!
//! This module provides functionality for:
//! - Loading settings from ~/.app-book/launcher_config.json
//! - Default values for all settings
//! - Deriving the dependency resolution policy from the live settings
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - Settings and policy definitions
//! - `loader` - File system loading and saving

mod defaults;
mod loader;
mod types;

pub use defaults::{DEFAULT_FONT_SIZE, DEFAULT_THEME};
pub use types::{ResolutionPolicy, Settings};
pub use loader::{load_settings, load_settings_for_launch, save_settings, update_settings};

#[cfg(test)]
pub use defaults::default_python_path;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
