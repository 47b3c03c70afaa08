//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Default console font size
pub const DEFAULT_FONT_SIZE: u32 = 12;

/// Default color theme name
pub const DEFAULT_THEME: &str = "dark";

pub const DEFAULT_RUN_ON_STARTUP: bool = false;
pub const DEFAULT_OFFLINE_MODE: bool = false;

/// Base interpreter used to provision the isolated environment
pub fn default_python_path() -> String {
    if cfg!(windows) {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}
