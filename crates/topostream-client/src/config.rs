//! Configuration loading for the topology client.
//!
//! Every field is optional. `TOPOSTREAM_URL` overrides `url`.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use topostream_types::FilterCriteria;

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

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// `WebSocket` URL of the stream endpoint.
    #[serde(default = "default_url")]
    pub url: String,

    /// Locations to subscribe to. Absent subscribes to everything.
    #[serde(default)]
    pub locations: Option<BTreeSet<String>>,

    /// How long a connection attempt may take.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Reconnect delays.
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Default log filter for the watch binary when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ClientConfig {
    /// Configuration pointing at `url` with every other field defaulted.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

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
        if let Ok(url) = std::env::var("TOPOSTREAM_URL") {
            config.url = url;
        }
        Ok(config)
    }

    /// Criteria sent with every SUBSCRIBE.
    pub fn criteria(&self) -> Option<FilterCriteria> {
        self.locations
            .as_ref()
            .map(|locations| FilterCriteria::for_locations(locations.iter().cloned()))
    }

    /// The connect timeout as a [`Duration`].
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            locations: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            backoff: BackoffConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Exponential reconnect delay bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,

    /// Upper bound on the exponential part of the delay.
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            max_ms: default_max_ms(),
        }
    }
}

fn default_url() -> String {
    String::from("ws://127.0.0.1:8980/ws")
}

const fn default_connect_timeout_ms() -> u64 {
    5000
}

const fn default_base_ms() -> u64 {
    500
}

const fn default_max_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    String::from("info")
}
