//! Command implementations.

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use kiln_core::Config;

pub mod build;
pub mod start;

/// Load the configuration at `config_path`, rooting relative paths at the
/// file's directory. A missing file yields the defaults.
pub fn load_config(config_path: &Path) -> Result<Config> {
    let config = Config::load_with_env(config_path).wrap_err_with(|| {
        format!("Failed to load configuration from {}", config_path.display())
    })?;

    let cwd = std::env::current_dir().wrap_err("Failed to read current directory")?;
    let root = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
        _ => cwd,
    };

    tracing::debug!(root = %root.display(), "resolved project root");
    Ok(config.rooted_at(&root))
}
