//! Application paths for dev, portable and installed runs.
//!
//! - **Dev mode** (debug builds only): a `config.yaml` in the working
//!   directory wins, state and logs live next to it.
//! - **Portable mode**: a `.portable` marker next to the executable keeps
//!   everything in the executable's directory.
//! - **Installed mode** (default): data lives under the platform data
//!   directory, in `Surface Mixer/`.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "Surface Mixer";

/// How the data directory was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Dev,
    Portable,
    Installed,
}

/// Application paths for config, state, and logs.
#[derive(Debug, Clone, PartialEq)]
pub struct AppPaths {
    pub config: PathBuf,
    /// Directory holding the sled database
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub mode: RunMode,
}

impl AppPaths {
    /// Detect the paths from the running environment.
    ///
    /// Called before logging is initialized; nothing is logged here.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        Self::resolve(
            &exe_dir,
            cfg!(debug_assertions).then_some(cwd.as_path()),
            dirs::data_dir(),
        )
    }

    /// Pick the paths from explicit locations.
    ///
    /// `dev_dir` is only consulted when given (debug builds).
    pub fn resolve(exe_dir: &Path, dev_dir: Option<&Path>, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dev_dir.filter(|d| d.join("config.yaml").exists()) {
            return Self::rooted(dir, ".state", RunMode::Dev);
        }

        if exe_dir.join(".portable").exists() {
            return Self::rooted(exe_dir, ".state", RunMode::Portable);
        }

        let app_data = data_dir.unwrap_or_else(|| exe_dir.to_path_buf()).join(APP_NAME);
        Self::rooted(&app_data, "state", RunMode::Installed)
    }

    fn rooted(dir: &Path, state: &str, mode: RunMode) -> Self {
        Self {
            config: dir.join("config.yaml"),
            state_dir: dir.join(state),
            logs_dir: dir.join("logs"),
            mode,
        }
    }

    /// Replace the state directory (config override)
    pub fn with_state_dir(mut self, state_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = state_dir {
            self.state_dir = dir;
        }
        self
    }

    /// Use an explicit config file (command line)
    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        if let Some(path) = config {
            self.config = path;
        }
        self
    }

    /// Create the state, logs and config directories if missing
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        let config_dir = self.config.parent().filter(|p| !p.as_os_str().is_empty());
        for dir in [Some(self.state_dir.as_path()), Some(self.logs_dir.as_path()), config_dir]
            .into_iter()
            .flatten()
        {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// The sled database path (within state_dir)
    pub fn sled_db_path(&self) -> PathBuf {
        self.state_dir.join("sled")
    }
}
