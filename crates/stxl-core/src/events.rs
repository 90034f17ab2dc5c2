//! Structured camera events
//!
//! Write mismatches, latchup detections and recovery attempts are reported
//! through an [`EventSink`] owned by the session rather than through ambient
//! logging, so callers and tests can observe them directly. [`TracingSink`]
//! is the default and forwards every event to `tracing`.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::schema::SettingKey;
use crate::value::SettingValue;

/// Severity of a camera event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Something the driver observed that a caller may care about
#[derive(Debug, Clone, PartialEq)]
pub enum CameraEvent {
    /// A setting read back differently from what was written
    WriteMismatch {
        key: SettingKey,
        expected: SettingValue,
        actual: SettingValue,
        tolerated: bool,
    },
    /// Exposure state machine moved
    ExposureTransition { from: String, to: String },
    /// Cooler saturated while the CCD stayed above setpoint
    LatchupDetected {
        temperature_c: f64,
        setpoint_c: f64,
        cooler_power_pct: f64,
    },
    /// Recovery strategy is about to run
    RecoveryStarted,
    /// Recovery strategy returned
    RecoveryFinished { success: bool, detail: Option<String> },
    /// Camera reboot requested
    Rebooted,
}

impl CameraEvent {
    pub fn severity(&self) -> Severity {
        match self {
            CameraEvent::WriteMismatch {
                tolerated: true, ..
            } => Severity::Info,
            CameraEvent::WriteMismatch {
                tolerated: false, ..
            } => Severity::Error,
            CameraEvent::ExposureTransition { .. } => Severity::Info,
            CameraEvent::LatchupDetected { .. } => Severity::Warning,
            CameraEvent::RecoveryStarted => Severity::Warning,
            CameraEvent::RecoveryFinished { success: true, .. } => Severity::Info,
            CameraEvent::RecoveryFinished { success: false, .. } => Severity::Error,
            CameraEvent::Rebooted => Severity::Info,
        }
    }
}

/// Receiver for camera events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: CameraEvent);
}

/// Forwards events to `tracing` at their severity
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: CameraEvent) {
        match &event {
            CameraEvent::WriteMismatch {
                key,
                expected,
                actual,
                tolerated: true,
            } => info!(%key, %expected, %actual, "Tolerated write mismatch"),
            CameraEvent::WriteMismatch {
                key,
                expected,
                actual,
                tolerated: false,
            } => error!(%key, %expected, %actual, "Write not verified"),
            CameraEvent::ExposureTransition { from, to } => {
                debug!(%from, %to, "Exposure state changed")
            }
            CameraEvent::LatchupDetected {
                temperature_c,
                setpoint_c,
                cooler_power_pct,
            } => warn!(
                temperature_c,
                setpoint_c, cooler_power_pct, "Cooling latchup detected"
            ),
            CameraEvent::RecoveryStarted => warn!("Running latchup recovery"),
            CameraEvent::RecoveryFinished {
                success: true,
                detail,
            } => info!(?detail, "Latchup recovery finished"),
            CameraEvent::RecoveryFinished {
                success: false,
                detail,
            } => error!(?detail, "Latchup recovery failed"),
            CameraEvent::Rebooted => info!("Camera reboot requested"),
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CameraEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<CameraEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&CameraEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: CameraEvent) {
        self.events.lock().push(event);
    }
}

/// Forwards every event to several sinks
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: CameraEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
