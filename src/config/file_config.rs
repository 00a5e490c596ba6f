//! Configuration file support.
//!
//! TOML files are layered with environment variable overrides through the
//! `config` crate.
//!
//! # Configuration File Format
//!
//! ```toml
//! [site]
//! base_url = "https://www.cambridge.org"
//!
//! [extraction]
//! style = "chicago"
//! wait_timeout_secs = 5
//! click_attempts = 3
//!
//! [retry]
//! policy = "bounded"
//! max_attempts = 5
//!
//! [concurrency]
//! workers = 5
//!
//! [output]
//! base_path = "output"
//! formats = ["csv", "xlsx"]
//!
//! [browser]
//! headless = true
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Environment variables use the `CITATION_HARVESTER` prefix with `__`
//! between section and key, e.g. `CITATION_HARVESTER_CONCURRENCY__WORKERS=8`.

use std::path::{Path, PathBuf};

use super::Config;

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "citation-harvester.toml";

const ENV_PREFIX: &str = "CITATION_HARVESTER";

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Load configuration from a file, overlaid with environment variables
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Io(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Defaults overlaid with environment variables, for runs without a file
pub fn load_env_config() -> Result<Config, ConfigError> {
    let settings = config::Config::builder()
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Save configuration as pretty TOML
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
    }

    std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
}

/// Default locations, in lookup order
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("citation-harvester").join("config.toml"));
    }
    paths
}

/// First existing config file in the default locations
pub fn find_config_file() -> Option<PathBuf> {
    config_search_paths().into_iter().find(|p| p.is_file())
}
