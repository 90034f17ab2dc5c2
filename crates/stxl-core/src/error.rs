//! Error types for camera operations

use std::time::Duration;

use thiserror::Error;

use crate::schema::SettingKey;
use crate::transport::TransportError;
use crate::value::SettingValue;

/// Result type for camera operations
pub type Result<T> = std::result::Result<T, CameraError>;

/// A setting that read back differently from what was written
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub key: SettingKey,
    pub expected: SettingValue,
    pub actual: SettingValue,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "wrote {}={} but read {}",
            self.key, self.expected, self.actual
        )
    }
}

fn describe(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while driving the camera
#[derive(Debug, Error)]
pub enum CameraError {
    /// Network or connection failure (never retried by the driver)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Non-tolerant setting did not read back as written
    #[error("Configuration not verified: {}", describe(.mismatches))]
    Configuration { mismatches: Vec<Mismatch> },

    /// Camera status never reached the expected value
    #[error("Timed out after {waited:?} waiting for {operation}")]
    Timeout {
        operation: String,
        waited: Duration,
    },

    /// Setting name or value rejected by the schema before sending
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Exposure parameters rejected before starting
    #[error("Invalid exposure request: {0}")]
    InvalidRequest(String),

    /// Camera replied with something the schema cannot interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Exposure state machine asked to make an illegal move
    #[error("Invalid exposure transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Saving a captured frame failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration file could not be loaded
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl CameraError {
    /// Create a timeout error for the named operation
    pub fn timeout(operation: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            waited,
        }
    }

    /// Returns true for the timeout kind
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the mismatches of a configuration error, empty otherwise
    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            Self::Configuration { mismatches } => mismatches,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_names_key_and_values() {
        let err = CameraError::Configuration {
            mismatches: vec![Mismatch {
                key: SettingKey::Bin,
                expected: SettingValue::Integer(2),
                actual: SettingValue::Integer(1),
            }],
        };

        assert_eq!(
            err.to_string(),
            "Configuration not verified: wrote Bin=2 but read 1"
        );
        assert_eq!(err.mismatches().len(), 1);
    }

    #[test]
    fn test_timeout_helper() {
        let err = CameraError::timeout("filter wheel settle", Duration::from_secs(10));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("filter wheel settle"));
    }
}
