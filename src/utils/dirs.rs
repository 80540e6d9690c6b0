use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

pub static APP_DIR: &str = "proxyhub";
pub static CONFIG_FILE: &str = "config.yaml";
pub static STORAGE_FILE: &str = "storage.json";
pub static LOG_FILE: &str = "proxyhub.log";

/// Overrides the process configuration path.
pub static CONFIG_ENV: &str = "PROXYHUB_CONFIG";

/// get the data dir of the app
pub fn app_home_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| anyhow!("failed to resolve the user data directory"))
}

pub fn app_config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
        .ok_or_else(|| anyhow!("failed to resolve the user config directory"))
}

pub fn storage_path(home: &Path) -> PathBuf {
    home.join(STORAGE_FILE)
}

pub fn app_logs_dir(home: &Path) -> PathBuf {
    home.join("logs")
}
