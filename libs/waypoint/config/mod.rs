use geosockets::{ExponentialBackoff, QueryCredentials};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default subscriber endpoint
pub const DEFAULT_SUBSCRIBER_URL: &str = "wss://stream.waypoint.io/v1/subscribe";

/// Default publisher endpoint
pub const DEFAULT_PUBLISHER_URL: &str = "wss://stream.waypoint.io/v1/publish";

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: Option<usize> = Some(10);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_API_KEY: &str = "WAYPOINT_API_KEY";
pub const ENV_TOKEN: &str = "WAYPOINT_TOKEN";
pub const ENV_NAMESPACE: &str = "WAYPOINT_NAMESPACE";
pub const ENV_MAP_UUID: &str = "WAYPOINT_MAP_UUID";
pub const ENV_SUBSCRIBER_URL: &str = "WAYPOINT_SUBSCRIBER_URL";
pub const ENV_PUBLISHER_URL: &str = "WAYPOINT_PUBLISHER_URL";
pub const ENV_DEBUG: &str = "WAYPOINT_DEBUG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// API credentials; at least one must be present
///
/// A token wins over an API key when both are configured.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub token: Option<String>,
}

impl Credentials {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            token: None,
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self {
            api_key: None,
            token: Some(token.into()),
        }
    }

    /// Read `WAYPOINT_API_KEY` / `WAYPOINT_TOKEN`
    pub fn from_env() -> Self {
        Self {
            api_key: env_opt(ENV_API_KEY),
            token: env_opt(ENV_TOKEN),
        }
    }

    pub fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
        blank(&self.api_key) && blank(&self.token)
    }

    /// Query-string auth provider for the connection manager
    pub fn to_auth(&self) -> QueryCredentials {
        QueryCredentials::new(self.api_key.clone(), self.token.clone())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("token", &mask(&self.token))
            .finish()
    }
}

/// Session configuration shared by subscriber, publisher and unified sessions
///
/// Immutable once a session has been built from it.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub credentials: Credentials,
    pub namespace: String,
    pub subscriber_url: String,
    pub publisher_url: String,
    /// Enables the publisher side of a unified session
    pub map_uuid: Option<String>,
    pub debug: bool,
    pub reconnect_interval: Duration,
    /// `None` retries forever
    pub max_reconnect_attempts: Option<usize>,
    pub max_reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn new(namespace: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            credentials,
            namespace: namespace.into(),
            subscriber_url: DEFAULT_SUBSCRIBER_URL.to_string(),
            publisher_url: DEFAULT_PUBLISHER_URL.to_string(),
            map_uuid: None,
            debug: false,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_map_uuid(mut self, map_uuid: impl Into<String>) -> Self {
        self.map_uuid = Some(map_uuid.into());
        self
    }

    pub fn with_subscriber_url(mut self, url: impl Into<String>) -> Self {
        self.subscriber_url = url.into();
        self
    }

    pub fn with_publisher_url(mut self, url: impl Into<String>) -> Self {
        self.publisher_url = url.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: Option<usize>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Load configuration from environment variables (and `.env`)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let namespace = env_opt(ENV_NAMESPACE)
            .ok_or_else(|| ConfigError::EnvVarMissing(ENV_NAMESPACE.to_string()))?;

        let mut config = Self::new(namespace, Credentials::from_env());
        config.map_uuid = env_opt(ENV_MAP_UUID);
        if let Some(url) = env_opt(ENV_SUBSCRIBER_URL) {
            config.subscriber_url = url;
        }
        if let Some(url) = env_opt(ENV_PUBLISHER_URL) {
            config.publisher_url = url;
        }
        config.debug = env_opt(ENV_DEBUG).is_some_and(|v| parse_flag(&v));

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file; credentials come from the environment
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let yaml_content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml_content, Credentials::from_env())
    }

    /// Parse YAML content with explicit credentials
    pub fn from_yaml_str(yaml: &str, credentials: Credentials) -> Result<Self> {
        let file: SessionFile = serde_yaml::from_str(yaml)?;
        let config = file.into_config(credentials);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "namespace must not be empty".to_string(),
            ));
        }

        if self.credentials.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "either {} or {} must be set",
                ENV_API_KEY, ENV_TOKEN
            )));
        }

        for (name, url) in [
            ("subscriber_url", &self.subscriber_url),
            ("publisher_url", &self.publisher_url),
        ] {
            let parsed = Url::parse(url)
                .map_err(|e| ConfigError::ValidationError(format!("{name} is invalid: {e}")))?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must use ws:// or wss://, got {}",
                    parsed.scheme()
                )));
            }
        }

        if self.reconnect_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "reconnect_interval must be greater than 0".to_string(),
            ));
        }

        if self.max_reconnect_delay < self.reconnect_interval {
            return Err(ConfigError::ValidationError(
                "max_reconnect_delay must not be shorter than reconnect_interval".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Backoff derived from the reconnect settings
    pub fn reconnect_strategy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            self.reconnect_interval,
            self.max_reconnect_delay,
            self.max_reconnect_attempts,
        )
    }
}

/// On-disk shape of a session configuration
///
/// ```yaml
/// namespace: fleet-demo
/// map_uuid: 5d1c0a9e-...
/// debug: false
/// reconnect_interval_ms: 1000
/// max_reconnect_attempts: 10   # null retries forever
/// max_reconnect_delay_ms: 30000
/// connect_timeout_ms: 10000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    pub namespace: String,
    #[serde(default)]
    pub map_uuid: Option<String>,
    #[serde(default)]
    pub subscriber_url: Option<String>,
    #[serde(default)]
    pub publisher_url: Option<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: Option<usize>,
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl SessionFile {
    pub fn into_config(self, credentials: Credentials) -> SessionConfig {
        let mut config = SessionConfig::new(self.namespace, credentials);
        config.map_uuid = self.map_uuid;
        if let Some(url) = self.subscriber_url {
            config.subscriber_url = url;
        }
        if let Some(url) = self.publisher_url {
            config.publisher_url = url;
        }
        config.debug = self.debug;
        config.reconnect_interval = Duration::from_millis(self.reconnect_interval_ms);
        config.max_reconnect_attempts = self.max_reconnect_attempts;
        config.max_reconnect_delay = Duration::from_millis(self.max_reconnect_delay_ms);
        config.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        config
    }
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL.as_millis() as u64
}

fn default_max_reconnect_attempts() -> Option<usize> {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_max_reconnect_delay_ms() -> u64 {
    DEFAULT_MAX_RECONNECT_DELAY.as_millis() as u64
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
