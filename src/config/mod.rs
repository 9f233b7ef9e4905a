//! TOML configuration loading.
//!
//! The configuration types live in [`sf_core::config`]; this module finds,
//! parses and checks the file.

pub use sf_core::config::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Locations searched when no `--config` is given, in order.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./scribeforge.toml",
    "~/.config/scribeforge/config.toml",
    "/etc/scribeforge/config.toml",
];

/// Load configuration from a TOML file.
///
/// Contract violations (zero timeout, zero workers, ...) are errors; softer
/// problems are logged as warnings.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config = parse_config(&content)
        .with_context(|| format!("Invalid config file: {:?}", path))?;
    expand_paths(&mut config);

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    Ok(config)
}

/// Parse and check configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
    config.check()?;
    Ok(config)
}

/// Load config from `custom_path`, the first existing default location, or
/// fall back to defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Expand `~` in every configured filesystem path.
fn expand_paths(config: &mut Config) {
    fn expand(path: &Path) -> std::path::PathBuf {
        let s = path.to_string_lossy();
        std::path::PathBuf::from(shellexpand::tilde(&s).as_ref())
    }

    config.ledger.db_path = expand(&config.ledger.db_path);
    config.storage.data_dir = expand(&config.storage.data_dir);
    config.watch.paths = config.watch.paths.iter().map(|p| expand(p)).collect();
}
