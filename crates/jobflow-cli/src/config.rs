//! Configuration file handling for jobflow

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_SERVER: &str = "http://localhost:8000/api";

/// Configuration for the CLI tool
///
/// ```toml
/// server = "https://example.com/api"
/// output = "json"
/// poll_interval_ms = 1000
/// max_attempts = 60
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default server URL, including any path prefix
    pub server: Option<String>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Where the session token is kept
    pub token_file: Option<PathBuf>,
    /// Delay between status reads
    pub poll_interval_ms: Option<u64>,
    /// Status reads allowed while a job is pending
    pub max_attempts: Option<u32>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("jobflow"))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the default token file path
    pub fn default_token_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("token"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        server: Option<&str>,
        output: Option<&str>,
        no_color: bool,
    ) -> Result<MergedConfig> {
        let token_file = match &self.token_file {
            Some(path) => path.clone(),
            None => Self::default_token_path()?,
        };

        Ok(MergedConfig {
            server: server
                .map(String::from)
                .or_else(|| self.server.clone())
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            output: output
                .map(String::from)
                .or_else(|| self.output.clone())
                .unwrap_or_else(|| "table".to_string()),
            no_color: no_color || self.no_color.unwrap_or(false),
            token_file,
            poll_interval_ms: self.poll_interval_ms,
            max_attempts: self.max_attempts,
        })
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub server: String,
    pub output: String,
    pub no_color: bool,
    pub token_file: PathBuf,
    pub poll_interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
server = "https://jobs.example.com/api"
output = "json"
token_file = "/tmp/jobflow-token"
max_attempts = 60
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.as_deref(), Some("https://jobs.example.com/api"));
        assert_eq!(config.max_attempts, Some(60));
        assert_eq!(config.poll_interval_ms, None);
    }

    #[test]
    fn test_args_override_file() {
        let config = Config {
            server: Some("https://file.example.com".into()),
            output: Some("json".into()),
            token_file: Some("/tmp/t".into()),
            ..Default::default()
        };

        let merged = config
            .merge_with_args(Some("https://cli.example.com"), None, true)
            .unwrap();
        assert_eq!(merged.server, "https://cli.example.com");
        assert_eq!(merged.output, "json");
        assert!(merged.no_color);
        assert_eq!(merged.token_file, PathBuf::from("/tmp/t"));
    }

    #[test]
    fn test_defaults() {
        let config = Config {
            token_file: Some("/tmp/t".into()),
            ..Default::default()
        };
        let merged = config.merge_with_args(None, None, false).unwrap();
        assert_eq!(merged.server, DEFAULT_SERVER);
        assert_eq!(merged.output, "table");
        assert!(!merged.no_color);
    }
}
