//! CLI utilities for binaries
//!
//! Handles configuration loading and environment variables
//! for all binary executables.

use std::path::PathBuf;
use tracing::info;
use waypoint::SessionConfig;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Session configuration (config/session.yaml)
    Session,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Session => "config/session.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        "WAYPOINT_CONFIG_PATH"
    }
}

/// Load configuration path from environment or use default
///
/// A custom path always wins over the environment.
///
/// # Examples
/// ```
/// use waypoint_realtime::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Session);
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    if let ConfigType::Custom(path) = &config_type {
        return PathBuf::from(path);
    }
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Build the session configuration for a binary
///
/// Reads the YAML file at the resolved path when it exists, otherwise falls
/// back to `WAYPOINT_*` environment variables. Credentials always come from
/// the environment.
pub fn load_session_config(config_type: ConfigType) -> anyhow::Result<SessionConfig> {
    let path = load_config_from_env(config_type);
    let config = if path.exists() {
        info!(path = %path.display(), "Loading session configuration");
        SessionConfig::from_yaml(&path)?
    } else {
        info!(path = %path.display(), "No configuration file, using environment");
        SessionConfig::from_env()?
    };
    Ok(config)
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
