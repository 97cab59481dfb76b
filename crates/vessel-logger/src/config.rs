// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logger configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file yields the
//! standard vessel setup.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Output directory {} is unusable: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Logger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Directory where log files are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Log file name prefix.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Log file extension.
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// Rotate to a new file after this many seconds.
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_secs: u64,

    /// Write the record anyway if required fields are still missing after
    /// this many milliseconds.
    #[serde(default = "default_missing_field_timeout")]
    pub missing_field_timeout_ms: u64,

    /// Drop updates older than this many seconds.
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_secs: u64,

    /// Interval between statistics log lines (0 = disabled).
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Required field paths, in output column order.
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,

    /// Path -> source whose values are dropped for that path.
    #[serde(default = "default_excluded_sources")]
    pub excluded_sources: BTreeMap<String, String>,

    /// SignalK connection settings.
    #[serde(default)]
    pub signalk: SignalKConfig,
}

/// SignalK server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalKConfig {
    /// Host and port of the SignalK TCP stream.
    #[serde(default = "default_signalk_address")]
    pub address: String,

    /// Requested reporting period per subscribed path.
    #[serde(default = "default_period")]
    pub period_ms: u64,

    /// Paths to subscribe to.
    #[serde(default = "default_subscriptions")]
    pub subscriptions: Vec<String>,

    /// Delay before reconnecting after a connection error.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_file_prefix() -> String {
    "signalk-".to_string()
}

fn default_file_extension() -> String {
    "log".to_string()
}

fn default_rotation_interval() -> u64 {
    300
}

fn default_missing_field_timeout() -> u64 {
    2000
}

fn default_stale_threshold() -> u64 {
    15
}

fn default_stats_interval() -> u64 {
    60
}

fn default_signalk_address() -> String {
    "localhost:8375".to_string()
}

fn default_period() -> u64 {
    1000
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_required_fields() -> Vec<String> {
    [
        "environment.depth.belowTransducer",
        "environment.water.temperature",
        "environment.wind.angleApparent",
        "environment.wind.speedApparent",
        "navigation.courseOverGroundTrue",
        "navigation.headingMagnetic",
        "navigation.magneticVariation",
        "navigation.rateOfTurn",
        "navigation.speedOverGround",
        "navigation.speedThroughWater",
        "navigation.attitude.pitch",
        "navigation.attitude.yaw",
        "navigation.attitude.roll",
        "navigation.position.longitude",
        "navigation.position.latitude",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_excluded_sources() -> BTreeMap<String, String> {
    [
        ("environment.wind.angleApparent", "can0.15"),
        ("environment.wind.speedApparent", "can0.15"),
        ("navigation.courseOverGroundTrue", "can0.85"),
        ("navigation.datetime", "can0.85"),
        ("navigation.headingMagnetic", "can0.85"),
        ("navigation.magneticVariation", "can0.85"),
        ("navigation.speedOverGround", "can0.85"),
        ("navigation.position", "can0.85"),
    ]
    .into_iter()
    .map(|(path, source)| (path.to_string(), source.to_string()))
    .collect()
}

fn default_subscriptions() -> Vec<String> {
    [
        "environment.depth.belowTransducer",
        "environment.water.temperature",
        "environment.wind.angleApparent",
        "environment.wind.speedApparent",
        "navigation.courseOverGroundTrue",
        "navigation.datetime",
        "navigation.headingMagnetic",
        "navigation.magneticVariation",
        "navigation.rateOfTurn",
        "navigation.speedOverGround",
        "navigation.speedThroughWater",
        "navigation.attitude",
        "navigation.position",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for SignalKConfig {
    fn default() -> Self {
        Self {
            address: default_signalk_address(),
            period_ms: default_period(),
            subscriptions: default_subscriptions(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            file_extension: default_file_extension(),
            rotation_interval_secs: default_rotation_interval(),
            missing_field_timeout_ms: default_missing_field_timeout(),
            stale_threshold_secs: default_stale_threshold(),
            stats_interval_secs: default_stats_interval(),
            required_fields: default_required_fields(),
            excluded_sources: default_excluded_sources(),
            signalk: SignalKConfig::default(),
        }
    }
}

impl LoggerConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.required_fields.is_empty() {
            return Err(ConfigError::Invalid("No required fields configured".into()));
        }

        let mut seen = HashSet::new();
        for field in &self.required_fields {
            if field.is_empty() {
                return Err(ConfigError::Invalid("Empty required field path".into()));
            }
            if !seen.insert(field.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Required field {} listed more than once",
                    field
                )));
            }
        }

        if self.rotation_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "rotation_interval_secs must be greater than 0".into(),
            ));
        }

        if self.missing_field_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "missing_field_timeout_ms must be greater than 0".into(),
            ));
        }

        for (name, value) in [
            ("file_prefix", &self.file_prefix),
            ("file_extension", &self.file_extension),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
            if value.contains(['/', '\\']) {
                return Err(ConfigError::Invalid(format!(
                    "{} must not contain a path separator: {}",
                    name, value
                )));
            }
        }

        Ok(())
    }

    /// Create the output directory if needed and check it is writable.
    pub fn prepare_output_dir(&self) -> Result<(), ConfigError> {
        let dir_error = |source: std::io::Error| ConfigError::OutputDir {
            path: self.output_dir.clone(),
            source,
        };

        std::fs::create_dir_all(&self.output_dir).map_err(dir_error)?;
        let metadata = std::fs::metadata(&self.output_dir).map_err(dir_error)?;
        if !metadata.is_dir() {
            return Err(dir_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a directory",
            )));
        }
        if metadata.permissions().readonly() {
            return Err(dir_error(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "directory is read-only",
            )));
        }
        Ok(())
    }

    /// File rotation interval.
    pub fn rotation_interval(&self) -> Result<TimeDelta, ConfigError> {
        to_time_delta("rotation_interval_secs", Duration::from_secs(self.rotation_interval_secs))
    }

    /// Missing-field flush timeout.
    pub fn missing_field_timeout(&self) -> Result<TimeDelta, ConfigError> {
        to_time_delta(
            "missing_field_timeout_ms",
            Duration::from_millis(self.missing_field_timeout_ms),
        )
    }

    /// Maximum accepted update age.
    pub fn stale_threshold(&self) -> Result<TimeDelta, ConfigError> {
        to_time_delta("stale_threshold_secs", Duration::from_secs(self.stale_threshold_secs))
    }
}

fn to_time_delta(name: &str, duration: Duration) -> Result<TimeDelta, ConfigError> {
    TimeDelta::from_std(duration)
        .map_err(|_| ConfigError::Invalid(format!("{} is out of range", name)))
}
