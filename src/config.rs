//! Server configuration.
//!
//! This module provides the options that shape a queueserve instance: the
//! listening address, queue capacity, worker count, and scheduling policy.
//! Values are layered from defaults, an optional YAML file, environment
//! variables, and finally command-line flags.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scheduler::SchedulingPolicy;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 2222;

/// Default number of queue slots.
pub const DEFAULT_CAPACITY: usize = 16;

/// Configuration for the queueserve server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    // Network settings
    /// Address to bind the listener to.
    pub bind_addr: String,
    /// TCP port to listen on.
    pub port: u16,

    // Scheduling settings
    /// Number of queue slots per connection.
    pub capacity: usize,
    /// Number of worker threads per connection.
    pub worker_count: usize,
    /// Ordering discipline applied on enqueue.
    pub policy: SchedulingPolicy,

    // Reporting settings
    /// Log the queue contents after every completion and rejection.
    pub dump_queue: bool,
    /// Exit after the first connection closes.
    pub once: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            worker_count: 1,
            policy: SchedulingPolicy::Fifo,
            dump_queue: true,
            once: false,
        }
    }
}

impl ServerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a YAML file. Missing keys keep defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read and
    /// `ConfigError::Yaml` if it is not valid YAML for this structure.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parses a configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Overrides fields from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QUEUESERVE_BIND`: Bind address
    /// - `QUEUESERVE_PORT`: TCP port
    /// - `QUEUESERVE_CAPACITY`: Queue slots
    /// - `QUEUESERVE_WORKERS`: Worker threads
    /// - `QUEUESERVE_POLICY`: `FIFO` or `SJN`
    /// - `QUEUESERVE_DUMP_QUEUE`: Log queue contents (true/false)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Overrides fields from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("QUEUESERVE_BIND") {
            self.bind_addr = val;
        }

        if let Some(val) = lookup("QUEUESERVE_PORT") {
            self.port = parse_env_value(&val, "QUEUESERVE_PORT")?;
        }

        if let Some(val) = lookup("QUEUESERVE_CAPACITY") {
            self.capacity = parse_env_value(&val, "QUEUESERVE_CAPACITY")?;
        }

        if let Some(val) = lookup("QUEUESERVE_WORKERS") {
            self.worker_count = parse_env_value(&val, "QUEUESERVE_WORKERS")?;
        }

        if let Some(val) = lookup("QUEUESERVE_POLICY") {
            self.policy = val.parse()?;
        }

        if let Some(val) = lookup("QUEUESERVE_DUMP_QUEUE") {
            self.dump_queue = parse_env_bool(&val, "QUEUESERVE_DUMP_QUEUE")?;
        }

        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "capacity must be at least 1".to_string(),
            ));
        }

        if self.worker_count == 0 {
            return Err(ConfigError::ValidationFailed(
                "worker_count must be at least 1".to_string(),
            ));
        }

        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "bind_addr cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the `host:port` string to bind.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Builder method to set the bind address.
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Builder method to set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder method to set the queue capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builder method to set the worker count.
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    /// Builder method to set the scheduling policy.
    pub fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder method to enable or disable queue dumps.
    pub fn with_dump_queue(mut self, enabled: bool) -> Self {
        self.dump_queue = enabled;
        self
    }

    /// Builder method to serve a single connection.
    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }
}

/// Parse an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
