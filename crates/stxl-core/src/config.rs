//! Camera driver configuration
//!
//! Loaded from YAML or TOML, or built programmatically. Every field has a
//! default, so an empty document is a valid configuration:
//!
//! ```yaml
//! connection:
//!   base_url: "http://10.0.1.3"
//!   request_ms: 60000
//!
//! polling:
//!   interval_ms: 1000
//!   settle_timeout_ms: 10000
//!
//! latchup:
//!   margin_c: 2.0
//!   saturation_pct: 100.0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poll::PollSpec;

/// Top-level driver configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera address and HTTP timeouts
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Status polling intervals and bounds
    #[serde(default)]
    pub polling: PollingConfig,

    /// Latchup detection thresholds
    #[serde(default)]
    pub latchup: LatchupConfig,

    /// Cooldown wait after initialization
    #[serde(default)]
    pub cooldown: CooldownConfig,

    /// Reboot handling
    #[serde(default)]
    pub reboot: RebootConfig,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the camera's web server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in milliseconds (default: 60s)
    #[serde(default = "default_request_timeout")]
    pub request_ms: u64,

    /// Connect timeout in milliseconds (default: 10s)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,

    /// Timeout for the reboot request, which the camera never answers (default: 1s)
    #[serde(default = "default_reboot_request_timeout")]
    pub reboot_request_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_ms: default_request_timeout(),
            connect_ms: default_connect_timeout(),
            reboot_request_ms: default_reboot_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://10.0.1.3".to_string()
}

fn default_request_timeout() -> u64 {
    60_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_reboot_request_timeout() -> u64 {
    1_000
}

/// Polling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Status poll interval during an exposure (default: 1s)
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Time allowed beyond the exposure time for readout (default: 10s)
    #[serde(default = "default_readout_margin")]
    pub readout_margin_ms: u64,

    /// Filter wheel settle poll interval (default: 1s)
    #[serde(default = "default_poll_interval")]
    pub settle_interval_ms: u64,

    /// Filter wheel settle timeout (default: 10s)
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            readout_margin_ms: default_readout_margin(),
            settle_interval_ms: default_poll_interval(),
            settle_timeout_ms: default_settle_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1_000
}

fn default_readout_margin() -> u64 {
    10_000
}

fn default_settle_timeout() -> u64 {
    10_000
}

impl PollingConfig {
    /// Polling bounds for an exposure of `exptime`
    pub fn exposure(&self, exptime: Duration) -> PollSpec {
        PollSpec::new(
            Duration::from_millis(self.interval_ms),
            exptime.saturating_add(Duration::from_millis(self.readout_margin_ms)),
        )
    }

    /// Polling bounds for the filter wheel
    pub fn settle(&self) -> PollSpec {
        PollSpec::new(
            Duration::from_millis(self.settle_interval_ms),
            Duration::from_millis(self.settle_timeout_ms),
        )
    }
}

/// Latchup thresholds.
///
/// Empirically tuned per camera; the defaults match the STXL units the driver
/// was developed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatchupConfig {
    /// Degrees above setpoint that count as "far above" (default: 2.0)
    #[serde(default = "default_latchup_margin")]
    pub margin_c: f64,

    /// Cooler power treated as saturated, in percent (default: 100.0)
    #[serde(default = "default_saturation")]
    pub saturation_pct: f64,
}

impl Default for LatchupConfig {
    fn default() -> Self {
        Self {
            margin_c: default_latchup_margin(),
            saturation_pct: default_saturation(),
        }
    }
}

fn default_latchup_margin() -> f64 {
    2.0
}

fn default_saturation() -> f64 {
    100.0
}

/// Cooldown wait configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Wait for the setpoint after initialization (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Samples in the running mean (default: 10)
    #[serde(default = "default_cooldown_samples")]
    pub samples: usize,

    /// Allowed distance of the mean from setpoint in °C (default: 0.05)
    #[serde(default = "default_cooldown_tolerance")]
    pub tolerance_c: f64,

    /// Sample interval (default: 1s)
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Give up after this long (default: 30 minutes)
    #[serde(default = "default_cooldown_timeout")]
    pub timeout_ms: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            samples: default_cooldown_samples(),
            tolerance_c: default_cooldown_tolerance(),
            interval_ms: default_poll_interval(),
            timeout_ms: default_cooldown_timeout(),
        }
    }
}

impl CooldownConfig {
    pub fn poll(&self) -> PollSpec {
        PollSpec::new(
            Duration::from_millis(self.interval_ms),
            Duration::from_millis(self.timeout_ms),
        )
    }
}

fn default_true() -> bool {
    true
}

fn default_cooldown_samples() -> usize {
    10
}

fn default_cooldown_tolerance() -> f64 {
    0.05
}

fn default_cooldown_timeout() -> u64 {
    1_800_000
}

/// Reboot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebootConfig {
    /// Wait after the reboot request before talking to the camera (default: 35s)
    #[serde(default = "default_reboot_settle")]
    pub settle_ms: u64,
}

impl Default for RebootConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_reboot_settle(),
        }
    }
}

fn default_reboot_settle() -> u64 {
    35_000
}

impl CameraConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a builder for programmatic configuration
    pub fn builder(base_url: impl Into<String>) -> CameraConfigBuilder {
        CameraConfigBuilder::new(base_url)
    }
}

/// Builder for [`CameraConfig`]
#[derive(Debug, Clone)]
pub struct CameraConfigBuilder {
    config: CameraConfig,
}

impl CameraConfigBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut config = CameraConfig::default();
        config.connection.base_url = base_url.into();
        Self { config }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection.request_ms = timeout.as_millis() as u64;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.polling.interval_ms = interval.as_millis() as u64;
        self.config.polling.settle_interval_ms = interval.as_millis() as u64;
        self.config.cooldown.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn readout_margin(mut self, margin: Duration) -> Self {
        self.config.polling.readout_margin_ms = margin.as_millis() as u64;
        self
    }

    pub fn settle_timeout(mut self, timeout: Duration) -> Self {
        self.config.polling.settle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn latchup(mut self, margin_c: f64, saturation_pct: f64) -> Self {
        self.config.latchup = LatchupConfig {
            margin_c,
            saturation_pct,
        };
        self
    }

    pub fn cooldown(mut self, enabled: bool) -> Self {
        self.config.cooldown.enabled = enabled;
        self
    }

    pub fn cooldown_timeout(mut self, timeout: Duration) -> Self {
        self.config.cooldown.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn reboot_settle(mut self, settle: Duration) -> Self {
        self.config.reboot.settle_ms = settle.as_millis() as u64;
        self
    }

    pub fn build(self) -> CameraConfig {
        self.config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
