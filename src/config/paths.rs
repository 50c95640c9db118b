//! Platform-specific configuration and log directory paths.
//!
//!   Windows: %APPDATA%/voice-dialog
//!   macOS:   ~/Library/Application Support/voice-dialog
//!   Linux:   $XDG_CONFIG_HOME/voice-dialog (default ~/.config)

use std::path::PathBuf;

const APP_DIR_NAME: &str = "voice-dialog";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Per-user configuration directory for this application.
pub fn get_config_dir() -> PathBuf {
    get_config_base().join(APP_DIR_NAME)
}

/// Directory the rolling log files are written to.
pub fn get_log_dir() -> PathBuf {
    get_config_dir().join("logs")
}

/// Settings files that are read if present, lowest priority first.
pub fn settings_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(3);

    #[cfg(unix)]
    paths.push(PathBuf::from("/etc").join(APP_DIR_NAME).join(SETTINGS_FILE_NAME));

    paths.push(get_config_dir().join(SETTINGS_FILE_NAME));
    paths.push(PathBuf::from(SETTINGS_FILE_NAME));
    paths
}

/// Get the platform-appropriate base config directory.
fn get_config_base() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata);
        }
        dirs::config_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("AppData")
                .join("Roaming")
        })
    }

    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library")
            .join("Application Support")
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // Respect XDG_CONFIG_HOME, default ~/.config
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
    }
}
