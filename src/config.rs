//! Configuration system for the TaskOrchard worker
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (TASKORCHARD_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

/// Main worker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Dispatch server connection settings
    pub worker: WorkerSettings,

    /// Task execution settings
    pub executor: ExecutorSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Dispatch server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Dispatch server WebSocket URL
    pub server_url: String,

    /// Worker group to register into
    pub group: String,

    /// Delay between reconnection attempts in seconds
    pub reconnect_interval: u64,

    /// Liveness probe interval in seconds
    pub heartbeat_interval: u64,

    /// Connection establishment timeout in seconds
    pub connect_timeout: u64,

    /// Human-readable worker name (log context only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Task execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Built-in task handler to run
    pub handler: String,

    /// Simulated work duration for the echo handler in milliseconds
    pub simulated_delay_ms: u64,

    /// Per-task timeout in seconds (0 = no timeout)
    pub task_timeout: u64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:3000/ws".to_string(),
            group: "default".to_string(),
            reconnect_interval: 5,
            heartbeat_interval: 30,
            connect_timeout: 30,
            name: None,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            handler: "echo".to_string(),
            simulated_delay_ms: 2000,
            task_timeout: 0,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl WorkerSettings {
    /// Delay between reconnection attempts
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval)
    }

    /// Interval between liveness probes
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }

    /// Connection establishment timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Build the session URL: `<server_url>?group=<group>`
    pub fn session_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.server_url).map_err(|e| {
            Error::config_field_invalid("worker.server_url", format!("invalid URL: {}", e))
        })?;
        url.query_pairs_mut().append_pair("group", &self.group);
        Ok(url)
    }
}

impl ExecutorSettings {
    /// Per-task timeout, if one is configured
    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout > 0).then(|| Duration::from_secs(self.task_timeout))
    }
}

/// Command-line overrides applied on top of file and environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub group: Option<String>,
}

impl WorkerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        Self::load_with(config_path, &CliOverrides::default())
    }

    /// Load configuration, then apply CLI overrides before validating
    pub fn load_with(config_path: Option<&str>, overrides: &CliOverrides) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = Self::from_toml(&content)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        config.apply_env_overrides();
        config.apply_cli_overrides(overrides);
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::config_parse(e.message().to_string(), Some(e)))
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            Some(PathBuf::from("taskorchard-worker.toml")),
            dirs::config_dir().map(|p| p.join("taskorchard").join("worker.toml")),
            dirs::home_dir().map(|p| p.join(".taskorchard").join("worker.toml")),
            Some(PathBuf::from("/etc/taskorchard/worker.toml")),
        ];

        for path in search_paths.iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TASKORCHARD_SERVER_URL") {
            self.worker.server_url = val;
        }
        if let Ok(val) = std::env::var("TASKORCHARD_GROUP") {
            self.worker.group = val;
        }
        if let Ok(val) = std::env::var("TASKORCHARD_RECONNECT_INTERVAL") {
            if let Ok(n) = val.parse() {
                self.worker.reconnect_interval = n;
            }
        }
        if let Ok(val) = std::env::var("TASKORCHARD_HEARTBEAT_INTERVAL") {
            if let Ok(n) = val.parse() {
                self.worker.heartbeat_interval = n;
            }
        }
        if let Ok(val) = std::env::var("TASKORCHARD_WORKER_NAME") {
            self.worker.name = Some(val);
        }

        if let Ok(val) = std::env::var("TASKORCHARD_HANDLER") {
            self.executor.handler = val;
        }
        if let Ok(val) = std::env::var("TASKORCHARD_TASK_TIMEOUT") {
            if let Ok(n) = val.parse() {
                self.executor.task_timeout = n;
            }
        }

        if let Ok(val) = std::env::var("TASKORCHARD_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("TASKORCHARD_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("TASKORCHARD_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Apply command-line overrides
    pub fn apply_cli_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(ref url) = overrides.server_url {
            self.worker.server_url = url.clone();
        }
        if let Some(ref group) = overrides.group {
            self.worker.group = group.clone();
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.worker.server_url).map_err(|e| {
            Error::config_field_invalid("worker.server_url", format!("invalid URL: {}", e))
        })?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(Error::config_field_invalid(
                "worker.server_url",
                "server_url must start with ws:// or wss://",
            ));
        }

        if self.worker.group.trim().is_empty() {
            return Err(Error::config_field_invalid("worker.group", "group cannot be empty"));
        }
        if self.worker.reconnect_interval == 0 {
            return Err(Error::config_field_invalid(
                "worker.reconnect_interval",
                "reconnect_interval must be at least 1 second",
            ));
        }
        if self.worker.heartbeat_interval == 0 {
            return Err(Error::config_field_invalid(
                "worker.heartbeat_interval",
                "heartbeat_interval must be at least 1 second",
            ));
        }
        if self.worker.connect_timeout == 0 {
            return Err(Error::config_field_invalid(
                "worker.connect_timeout",
                "connect_timeout must be at least 1 second",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".taskorchard")
                .join("worker.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# TaskOrchard Worker Configuration

[worker]
# Dispatch server WebSocket URL (the group is appended as ?group=<group>)
server_url = "ws://localhost:3000/ws"

# Worker group to register into
group = "default"

# Delay between reconnection attempts in seconds
reconnect_interval = 5

# Liveness probe interval in seconds
heartbeat_interval = 30

# Connection establishment timeout in seconds
connect_timeout = 30

# Human-readable worker name (log context only)
# name = "My Worker"

[executor]
# Built-in task handler: echo
handler = "echo"

# Simulated work duration for the echo handler in milliseconds
simulated_delay_ms = 2000

# Per-task timeout in seconds (0 = no timeout)
task_timeout = 0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.taskorchard/logs/worker.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
