//! Initialize the configuration directory: create ~/.parley, a default config, and the sessions directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;
use crate::recorder::FileSessionStore;

/// Ensure the configuration directory has been initialized (config file exists).
pub fn require_initialized(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `parley init` first (config file not found: {})",
            config_path.display()
        );
    }
    Ok(())
}

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with the default settings if missing.
/// - Creates the sessions directory the recorder writes to.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    let config = if !config_path.exists() {
        let default_config = config::Config::default();
        let body = serde_json::to_string_pretty(&default_config)
            .context("serializing default config")?;
        std::fs::write(config_path, body)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
        default_config
    } else {
        config::load_config(Some(config_path.to_path_buf()))?.0
    };

    let sessions_dir = config::resolve_sessions_dir(&config, config_path);
    if !sessions_dir.exists() {
        std::fs::create_dir_all(&sessions_dir)
            .with_context(|| format!("creating sessions directory {}", sessions_dir.display()))?;
        log::info!("created sessions directory at {}", sessions_dir.display());
    } else {
        log::debug!(
            "sessions directory already exists at {}, skipping",
            sessions_dir.display()
        );
    }

    Ok(config_dir.to_path_buf())
}

/// Open the file-backed session store, creating the directory when needed.
pub async fn open_session_store(sessions_dir: &Path) -> Result<FileSessionStore> {
    FileSessionStore::open(sessions_dir)
        .await
        .with_context(|| format!("opening session store at {}", sessions_dir.display()))
}
