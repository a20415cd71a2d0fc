//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration.
///
/// When `path` is `None`, the default location `<config-root>/rproxy.toml`
/// is tried; a missing file there simply yields the built-in defaults. An
/// explicitly given path must exist.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(explicit) => parse_file(explicit)?,
        None => {
            let default_path = default_config_file();
            if default_path.exists() {
                parse_file(&default_path)?
            } else {
                ProxyConfig::default()
            }
        }
    };

    apply_env_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn default_config_file() -> PathBuf {
    ProxyConfig::default().paths.config_dir.join("rproxy.toml")
}

fn parse_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Apply `RPROXY_DATA_DIR` and `LOG_LEVEL` environment overrides.
pub fn apply_env_overrides(config: &mut ProxyConfig) {
    if let Ok(data_dir) = std::env::var("RPROXY_DATA_DIR") {
        if !data_dir.is_empty() {
            config.paths.data_dir = PathBuf::from(data_dir);
        }
    }
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        if !level.is_empty() {
            config.observability.log_level = level.to_ascii_lowercase();
        }
    }
}
