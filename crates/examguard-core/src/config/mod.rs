//! Engine configuration parsing and validation.
//!
//! Configuration is TOML. Thresholds are tunable per deployment; the
//! risk score weight table is not configuration — it is part of the
//! external contract and lives in the violation type enum.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    /// Violation escalation thresholds and windows.
    #[serde(default)]
    pub integrity: IntegrityConfig,

    /// Fingerprint binding behavior.
    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    /// Durable store selection.
    #[serde(default)]
    pub store: StoreConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or
    /// validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Fail-closed validation of threshold and backend coherence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] on incoherent settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.integrity.warning_threshold == 0 {
            return Err(ConfigError::Validation(
                "integrity.warning_threshold must be at least 1".to_string(),
            ));
        }
        if self.integrity.termination_threshold <= self.integrity.warning_threshold {
            return Err(ConfigError::Validation(format!(
                "integrity.termination_threshold ({}) must exceed warning_threshold ({})",
                self.integrity.termination_threshold, self.integrity.warning_threshold
            )));
        }
        if self.integrity.window_secs == 0 {
            return Err(ConfigError::Validation(
                "integrity.window_secs must be positive".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.path.is_none() {
            return Err(ConfigError::Validation(
                "store.backend = \"sqlite\" requires store.path".to_string(),
            ));
        }
        Ok(())
    }
}

/// Violation escalation thresholds and windows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityConfig {
    /// Trailing window for repeat counting, seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Violation count at which questions lock.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: u32,

    /// Violation count at which the session terminates.
    #[serde(default = "default_termination_threshold")]
    pub termination_threshold: u32,
}

impl IntegrityConfig {
    /// The trailing window in milliseconds.
    #[must_use]
    pub const fn window_ms(&self) -> u64 {
        self.window_secs * 1000
    }
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            warning_threshold: default_warning_threshold(),
            termination_threshold: default_termination_threshold(),
        }
    }
}

const fn default_window_secs() -> u64 {
    600 // 10 minutes
}

const fn default_warning_threshold() -> u32 {
    2
}

const fn default_termination_threshold() -> u32 {
    3
}

/// Fingerprint binding behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FingerprintConfig {
    /// Elapsed seconds under which a fingerprint change is
    /// classified as a high-confidence (possible hijack) mismatch.
    #[serde(default = "default_rapid_change_threshold_secs")]
    pub rapid_change_threshold_secs: u64,
}

impl FingerprintConfig {
    /// The rapid-change threshold in milliseconds.
    #[must_use]
    pub const fn rapid_change_threshold_ms(&self) -> u64 {
        self.rapid_change_threshold_secs * 1000
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            rapid_change_threshold_secs: default_rapid_change_threshold_secs(),
        }
    }
}

const fn default_rapid_change_threshold_secs() -> u64 {
    300 // 5 minutes
}

/// Durable store selection, decided at startup — never probed
/// inside request paths.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Which backend to use.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database path; required for the `sqlite` backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Available store backends.
///
/// Defaults to `memory` so a bare config is runnable; durable
/// deployments opt into `sqlite` and must provide a path
/// (fail-closed — a missing path is a validation error, not a
/// silent fallback).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Durable `SQLite` store (WAL mode).
    Sqlite,
    /// In-process store for tests and single-process deployments.
    #[default]
    Memory,
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
