//! Client configuration with YAML support

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Job client configuration
///
/// Can be loaded from YAML or JSON, or constructed programmatically.
///
/// ```yaml
/// connection:
///   base_url: "http://localhost:8000/api"
///   token: "eyJ..."   # optional
///
/// polling:
///   interval_ms: 2000
///   max_attempts: 30
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connection settings
    pub connection: ConnectionConfig,

    /// Endpoint paths (configurable per deployment)
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    /// Polling policy
    #[serde(default)]
    pub polling: PollingConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Points catalog settings
    #[serde(default)]
    pub points: PointsConfig,
}

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the API, including any path prefix (e.g. `/api`)
    pub base_url: String,

    /// Bearer token to seed the credentials provider with (optional)
    #[serde(default)]
    pub token: Option<String>,
}

/// Endpoint paths, appended to the base URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Object store upload: POST multipart
    #[serde(default = "default_upload_path")]
    pub upload: String,

    /// Login: POST form
    #[serde(default = "default_login_path")]
    pub login: String,

    /// Points cost table: GET
    #[serde(default = "default_points_path")]
    pub points_configs: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            upload: default_upload_path(),
            login: default_login_path(),
            points_configs: default_points_path(),
        }
    }
}

fn default_upload_path() -> String {
    "/upload/image".to_string()
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_points_path() -> String {
    "/points/configs/dict".to_string()
}

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Fixed delay between status reads in milliseconds (default: 2s)
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Status reads allowed while the job is pending (default: 30)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_poll_interval() -> u64 {
    2_000 // 2 seconds
}

fn default_max_attempts() -> u32 {
    30
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// General request timeout in milliseconds (default: 15s)
    #[serde(default = "default_request_timeout")]
    pub request_ms: u64,

    /// Connect timeout in milliseconds (default: 10s)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_ms: default_request_timeout(),
            connect_ms: default_connect_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    15_000 // 15 seconds
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

/// Points catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsConfig {
    /// How long a fetched cost table is served from cache (default: 5 minutes)
    #[serde(default = "default_points_ttl")]
    pub cache_ttl_ms: u64,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_points_ttl(),
        }
    }
}

fn default_points_ttl() -> u64 {
    300_000 // 5 minutes
}

impl ClientConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a builder for programmatic configuration
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url)
    }

    /// Join an endpoint path onto the base URL, keeping the base path prefix
    pub fn endpoint_url(&self, path: &str) -> Result<url::Url, url::ParseError> {
        let base = self.connection.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        url::Url::parse(&format!("{}/{}", base, path))
    }
}

/// Builder for ClientConfig
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                connection: ConnectionConfig {
                    base_url: base_url.into(),
                    token: None,
                },
                endpoints: EndpointsConfig::default(),
                polling: PollingConfig::default(),
                timeouts: TimeoutsConfig::default(),
                points: PointsConfig::default(),
            },
        }
    }

    /// Set the initial bearer token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.connection.token = Some(token.into());
        self
    }

    /// Set the object upload path
    pub fn upload_path(mut self, path: impl Into<String>) -> Self {
        self.config.endpoints.upload = path.into();
        self
    }

    /// Set the poll interval in milliseconds
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.polling.interval_ms = ms;
        self
    }

    /// Set the pending-attempt budget
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.polling.max_attempts = attempts;
        self
    }

    /// Set request timeout in milliseconds
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.request_ms = ms;
        self
    }

    /// Set connect timeout in milliseconds
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.connect_ms = ms;
        self
    }

    /// Set the points cache TTL in milliseconds
    pub fn points_cache_ttl_ms(mut self, ms: u64) -> Self {
        self.config.points.cache_ttl_ms = ms;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
