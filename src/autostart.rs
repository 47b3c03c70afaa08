//! Run-on-startup registration
//!
//! # Platform Support
//! - Linux: XDG autostart entry at `~/.config/autostart/app-book.desktop`
//! - macOS 13+: SMAppService main-app login item
//! - Other platforms: No-op (returns success)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

/// File name of the XDG autostart entry
pub const DESKTOP_ENTRY_NAME: &str = "app-book.desktop";

/// Contents of the autostart entry launching `exec`
pub fn desktop_entry(exec: &Path) -> String {
    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name=App Book\n\
         Comment=Launcher for personal script apps\n\
         Exec={}\n\
         Terminal=false\n\
         X-GNOME-Autostart-enabled=true\n",
        exec.display()
    )
}

/// Write the autostart entry into `autostart_dir`, creating the directory
pub fn write_desktop_entry(autostart_dir: &Path, exec: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(autostart_dir)
        .with_context(|| format!("Failed to create {}", autostart_dir.display()))?;
    let entry = autostart_dir.join(DESKTOP_ENTRY_NAME);
    std::fs::write(&entry, desktop_entry(exec))
        .with_context(|| format!("Failed to write {}", entry.display()))?;
    Ok(entry)
}

/// Remove the autostart entry; a missing entry is not an error
pub fn remove_desktop_entry(autostart_dir: &Path) -> Result<()> {
    let entry = autostart_dir.join(DESKTOP_ENTRY_NAME);
    match std::fs::remove_file(&entry) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", entry.display())),
    }
}

/// Register or unregister the launcher to start with the user session
#[cfg(target_os = "linux")]
pub fn set_startup(enable: bool) -> Result<()> {
    let autostart_dir = dirs::config_dir()
        .context("No user config directory")?
        .join("autostart");

    if enable {
        let exe = std::env::current_exe().context("Cannot locate the launcher executable")?;
        let entry = write_desktop_entry(&autostart_dir, &exe)?;
        info!(entry = %entry.display(), "Run on startup enabled");
    } else {
        remove_desktop_entry(&autostart_dir)?;
        info!("Run on startup disabled");
    }
    Ok(())
}

#[cfg(target_os = "macos")]
pub fn set_startup(enable: bool) -> Result<()> {
    use smappservice_rs::{AppService, ServiceType};

    let service = AppService::new(ServiceType::MainApp);
    if enable {
        service
            .register()
            .map_err(|e| anyhow::anyhow!("Failed to register login item: {}", e))
            .context("SMAppService registration failed")?;
        info!("Run on startup enabled");
    } else {
        service
            .unregister()
            .map_err(|e| anyhow::anyhow!("Failed to unregister login item: {}", e))
            .context("SMAppService unregistration failed")?;
        info!("Run on startup disabled");
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn set_startup(enable: bool) -> Result<()> {
    tracing::debug!(enable, "set_startup: no-op on this platform");
    Ok(())
}
