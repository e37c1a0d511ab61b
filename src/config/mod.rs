//! Configuration Module
//!
//! TOML configuration for the Engine.IO transports with support for:
//! - Heartbeat timing sent in the handshake
//! - Long-polling payload limits
//! - WebSocket endpoint path
//! - Environment variable overrides (SOCKETIO__* prefix)

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("env var pattern is valid")
});

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .to_string()
}


/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Handshake and heartbeat settings
    pub engine: EngineConfig,
    /// Long-polling transport
    pub polling: PollingConfig,
    /// WebSocket transport
    pub websocket: WebSocketConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Engine configuration shared by every transport connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between client pings advertised in the handshake (e.g. "25s")
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,
    /// Idle timeout; also advertised in the handshake (e.g. "60s")
    #[serde(with = "humantime_serde")]
    pub ping_timeout: Duration,
    /// Label used in connection log lines
    pub namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(25),
            ping_timeout: Duration::from_secs(60),
            namespace: "/socket.io".to_string(),
        }
    }
}

/// Long-polling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Largest accepted POST body in bytes
    pub max_payload_size: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1024 * 1024,
        }
    }
}

/// WebSocket configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Request path prefix accepted during the upgrade
    pub path: String,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: "/socket.io/".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `SOCKETIO__` prefix with double underscores for nesting:
    ///    - `SOCKETIO__ENGINE__PING_TIMEOUT=30s` overrides `engine.ping_timeout`
    ///    - `SOCKETIO__POLLING__MAX_PAYLOAD_SIZE=65536` overrides `polling.max_payload_size`
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("engine.ping_interval", "25s")?
            .set_default("engine.ping_timeout", "60s")?
            .set_default("engine.namespace", "/socket.io")?
            .set_default("polling.max_payload_size", 1024 * 1024)?
            .set_default("websocket.path", "/socket.io/")?;

        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ConfigError::Io(e)),
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("SOCKETIO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.ping_interval.is_zero() {
            return Err(ConfigError::Validation(
                "engine.ping_interval must be greater than zero".to_string(),
            ));
        }
        if self.engine.ping_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "engine.ping_timeout must be greater than zero".to_string(),
            ));
        }
        if self.polling.max_payload_size == 0 {
            return Err(ConfigError::Validation(
                "polling.max_payload_size must be greater than zero".to_string(),
            ));
        }
        if !self.websocket.path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "websocket.path must start with '/', got '{}'",
                self.websocket.path
            )));
        }
        Ok(())
    }
}
