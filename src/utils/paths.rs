//! Application Paths
//!
//! Resolves the per-user data directory (`~/.chat-strategy/`).

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the application directory (~/.chat-strategy/)
pub fn app_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".chat-strategy"))
}

/// Get the config file path (~/.chat-strategy/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(app_dir()?.join("config.json"))
}

/// Get the knowledge database path (~/.chat-strategy/knowledge.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(app_dir()?.join("knowledge.db"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
