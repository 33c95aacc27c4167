//! Application path management for dev, portable and installed modes.
//!
//! - **Dev mode** (debug builds): `terra-monitor.yaml` in the working
//!   directory keeps everything next to it.
//! - **Portable mode**: a `.portable` marker next to the executable keeps
//!   config, logs and exports beside the binary.
//! - **Installed mode** (default): data lives under the platform data
//!   directory, e.g. `~/.local/share/Terra Monitor`.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "Terra Monitor";

/// Config file name in every mode
pub const CONFIG_FILE: &str = "terra-monitor.yaml";

/// Application paths for config, logs and exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Rolling log files
    pub logs_dir: PathBuf,
    /// CSV/JSON exports of the message log
    pub exports_dir: PathBuf,
    /// Whether data lives next to the executable or working directory
    pub is_portable: bool,
}

impl AppPaths {
    /// Paths rooted at a single base directory
    pub fn rooted(base: &Path, is_portable: bool) -> Self {
        Self {
            config: base.join(CONFIG_FILE),
            logs_dir: base.join("logs"),
            exports_dir: base.join("exports"),
            is_portable,
        }
    }

    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join(CONFIG_FILE).exists() {
                eprintln!(
                    "[paths] Running in DEV mode ({} found in cwd: {})",
                    CONFIG_FILE,
                    cwd.display()
                );
                return Self::rooted(&cwd, true);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::rooted(&exe_dir, true);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!(
                    "[paths] WARNING: dirs::data_dir() returned None, falling back to exe dir"
                );
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!(
            "[paths] Running in INSTALLED mode (data dir: {})",
            app_data.display()
        );

        Self::rooted(&app_data, false)
    }

    /// Override the config file location, keeping data directories as detected
    pub fn with_config(mut self, config: PathBuf) -> Self {
        self.config = config;
        self
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [&self.logs_dir, &self.exports_dir] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)?;
            }
        }

        if let Some(config_parent) = self.config.parent() {
            if !config_parent.as_os_str().is_empty() && !config_parent.exists() {
                debug!("Creating config directory: {}", config_parent.display());
                std::fs::create_dir_all(config_parent)?;
            }
        }

        Ok(())
    }
}
