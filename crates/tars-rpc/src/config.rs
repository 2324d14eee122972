// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client runtime configuration.
//!
//! Supports both programmatic and TOML file-based configuration. Every field
//! has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! locator = "tars.tarsregistry.QueryObj@tcp -h 10.0.0.1 -p 17890"
//! request_timeout_ms = 1500
//!
//! [transport]
//! queue_len = 20000
//!
//! [transport.tls]
//! ca_file = "/etc/tars/ca.pem"
//!
//! [health]
//! fail_threshold = 3
//! ```

use crate::adapter::HealthConfig;
use crate::selector::HashAlgorithm;
use crate::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Non-hash load balancing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalance {
    #[default]
    RoundRobin,
    Random,
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Registry object reference, if endpoints come from a registry.
    #[serde(default)]
    pub locator: Option<String>,

    /// Set division (`app.area.group`) used to scope endpoint lookups.
    #[serde(default)]
    pub set_division: Option<String>,

    /// Endpoint list refresh interval (ms).
    #[serde(default = "default_refresh_interval")]
    pub refresh_endpoint_interval_ms: u64,

    /// Adapter health check interval (ms).
    #[serde(default = "default_check_status_interval")]
    pub check_status_interval_ms: u64,

    /// Keepalive ping interval (ms), 0 disables keepalive.
    #[serde(default)]
    pub keep_alive_interval_ms: u64,

    /// Default timeout for synchronous calls (ms).
    #[serde(default = "default_invoke_timeout")]
    pub request_timeout_ms: u64,

    /// Default timeout for callback-style calls (ms).
    #[serde(default = "default_invoke_timeout")]
    pub async_invoke_timeout_ms: u64,

    /// Max in-flight invocations per servant proxy.
    #[serde(default = "default_obj_queue_max")]
    pub obj_queue_max: usize,

    /// Policy for calls without a hash key.
    #[serde(default)]
    pub load_balance: LoadBalance,

    /// Ring point algorithm for consistent-hash routing.
    #[serde(default)]
    pub consistent_hash_algorithm: HashAlgorithm,

    /// Fall back to unhealthy endpoints when no healthy one is left.
    #[serde(default = "default_true")]
    pub degrade_to_unhealthy: bool,

    /// JSON file persisting the last known endpoint lists.
    #[serde(default)]
    pub endpoint_cache_path: Option<PathBuf>,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub health: HealthConfig,
}

fn default_refresh_interval() -> u64 {
    60_000
}

fn default_check_status_interval() -> u64 {
    1_000
}

fn default_invoke_timeout() -> u64 {
    3_000
}

fn default_obj_queue_max() -> usize {
    100_000
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            locator: None,
            set_division: None,
            refresh_endpoint_interval_ms: default_refresh_interval(),
            check_status_interval_ms: default_check_status_interval(),
            keep_alive_interval_ms: 0,
            request_timeout_ms: default_invoke_timeout(),
            async_invoke_timeout_ms: default_invoke_timeout(),
            obj_queue_max: default_obj_queue_max(),
            load_balance: LoadBalance::RoundRobin,
            consistent_hash_algorithm: HashAlgorithm::Ketama,
            degrade_to_unhealthy: true,
            endpoint_cache_path: None,
            transport: TransportConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.queue_len == 0 {
            return Err(ConfigError::Validation("transport.queue_len must be > 0".into()));
        }
        if self.transport.max_package_length < crate::protocol::frame::FRAME_HEADER_SIZE {
            return Err(ConfigError::Validation(format!(
                "transport.max_package_length {} is below the frame header size",
                self.transport.max_package_length
            )));
        }
        for (name, value) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("async_invoke_timeout_ms", self.async_invoke_timeout_ms),
            ("refresh_endpoint_interval_ms", self.refresh_endpoint_interval_ms),
            ("check_status_interval_ms", self.check_status_interval_ms),
            ("transport.write_timeout_ms", self.transport.write_timeout_ms),
            ("transport.dial_timeout_ms", self.transport.dial_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{} must be > 0", name)));
            }
        }
        if !(self.health.fail_ratio > 0.0 && self.health.fail_ratio <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "health.fail_ratio {} must be in (0, 1]",
                self.health.fail_ratio
            )));
        }
        if self.obj_queue_max == 0 {
            return Err(ConfigError::Validation("obj_queue_max must be > 0".into()));
        }
        Ok(())
    }

    pub fn refresh_endpoint_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_endpoint_interval_ms)
    }

    pub fn check_status_interval(&self) -> Duration {
        Duration::from_millis(self.check_status_interval_ms)
    }

    /// `None` when keepalive is disabled.
    pub fn keep_alive_interval(&self) -> Option<Duration> {
        (self.keep_alive_interval_ms > 0).then(|| Duration::from_millis(self.keep_alive_interval_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn async_invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.async_invoke_timeout_ms)
    }

    /// Builder-style: set the default request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder-style: set the set division.
    pub fn with_set_division(mut self, set: impl Into<String>) -> Self {
        self.set_division = Some(set.into());
        self
    }
}

impl FromStr for ClientConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_toml(s)
    }
}
