//! Configuration loading for the streaming server.
//!
//! The server reads `topostream.yaml` from the working directory when it
//! exists and falls back to defaults otherwise. Every section and field is
//! optional. Environment variables override the listen address:
//!
//! - `TOPOSTREAM_HOST` overrides `server.host`
//! - `TOPOSTREAM_PORT` overrides `server.port`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TopostreamConfig {
    /// Listen address.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-connection streaming limits.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Backend data source.
    #[serde(default)]
    pub source: SourceConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TopostreamConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.server.apply_env_overrides();
        Ok(config)
    }
}

/// Address the HTTP and `WebSocket` listener binds to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// The host address to bind to (e.g. `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: String,

    /// The TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// Override the listen address with environment variables when set.
    ///
    /// An unparseable `TOPOSTREAM_PORT` is ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TOPOSTREAM_HOST") {
            self.host = val;
        }
        if let Some(port) = std::env::var("TOPOSTREAM_PORT")
            .ok()
            .and_then(|val| val.parse().ok())
        {
            self.port = port;
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Limits applied to every streaming connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamConfig {
    /// How long a broadcast may wait on a full outbox before the
    /// connection is dropped.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Number of encoded frames buffered per connection.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

impl StreamConfig {
    /// The send timeout as a [`Duration`].
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

/// Where the in-memory backend gets its initial data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    /// JSON file holding a `Topology` to seed the backend with.
    #[serde(default)]
    pub fixture: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8980
}

const fn default_send_timeout_ms() -> u64 {
    5000
}

const fn default_outbox_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TopostreamConfig::default();
        assert_eq!(config.server.port, 8980);
        assert_eq!(config.stream.send_timeout(), Duration::from_secs(5));
        assert_eq!(config.stream.outbox_capacity, 256);
        assert!(config.source.fixture.is_none());
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
server:
  host: "127.0.0.1"
stream:
  send_timeout_ms: 250
  outbox_capacity: 8
source:
  fixture: "fixtures/lab.json"
logging:
  level: "debug"
  format: json
"#;
        let config = TopostreamConfig::parse(yaml).unwrap();
        assert_eq!(config.stream.send_timeout(), Duration::from_millis(250));
        assert_eq!(config.stream.outbox_capacity, 8);
        assert_eq!(
            config.source.fixture,
            Some(PathBuf::from("fixtures/lab.json"))
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = TopostreamConfig::parse("stream:\n  outbox_capacity: 16\n").unwrap();
        assert_eq!(config.stream.outbox_capacity, 16);
        assert_eq!(config.stream.send_timeout_ms, 5000);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(TopostreamConfig::parse("").is_ok());
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let result = TopostreamConfig::parse("stream: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
