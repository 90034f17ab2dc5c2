//! Cooling latchup detection and recovery
//!
//! The STXL cooler occasionally gets stuck at full power while the CCD stays
//! well above setpoint. Only a reboot followed by a fresh initialization clears
//! it. Detection runs over the telemetry sampled during one exposure; recovery
//! runs a caller-supplied [`RecoveryStrategy`] at most once and never retries
//! the exposure.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::config::LatchupConfig;
use crate::error::Result;
use crate::events::CameraEvent;
use crate::exposure::TelemetrySample;
use crate::session::CameraSession;

/// Cooler saturated while the CCD stayed above setpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatchupEvent {
    /// Coldest temperature sampled during the exposure
    pub temperature_c: f64,
    pub setpoint_c: f64,
    /// Lowest cooler power sampled during the exposure
    pub cooler_power_pct: f64,
}

impl From<LatchupEvent> for CameraEvent {
    fn from(event: LatchupEvent) -> Self {
        CameraEvent::LatchupDetected {
            temperature_c: event.temperature_c,
            setpoint_c: event.setpoint_c,
            cooler_power_pct: event.cooler_power_pct,
        }
    }
}

/// Latchup thresholds applied to exposure telemetry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatchupDetector {
    margin_c: f64,
    saturation_pct: f64,
}

impl Default for LatchupDetector {
    fn default() -> Self {
        Self::from(&LatchupConfig::default())
    }
}

impl From<&LatchupConfig> for LatchupDetector {
    fn from(config: &LatchupConfig) -> Self {
        Self::new(config.margin_c, config.saturation_pct)
    }
}

impl LatchupDetector {
    pub fn new(margin_c: f64, saturation_pct: f64) -> Self {
        Self {
            margin_c,
            saturation_pct,
        }
    }

    /// Latchup means every sample shows a saturated cooler and even the
    /// coldest sample sits more than the margin above setpoint.
    ///
    /// No samples means no evidence, so no latchup.
    pub fn detect(&self, samples: &[TelemetrySample], setpoint_c: f64) -> Option<LatchupEvent> {
        if samples.is_empty() {
            return None;
        }

        let saturated = samples
            .iter()
            .all(|s| s.cooler_power_pct >= self.saturation_pct);
        let coldest = samples
            .iter()
            .map(|s| s.temperature_c)
            .fold(f64::INFINITY, f64::min);

        if saturated && coldest > setpoint_c + self.margin_c {
            let power = samples
                .iter()
                .map(|s| s.cooler_power_pct)
                .fold(f64::INFINITY, f64::min);
            Some(LatchupEvent {
                temperature_c: coldest,
                setpoint_c,
                cooler_power_pct: power,
            })
        } else {
            None
        }
    }
}

/// What happened after a latchup was detected
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecoveryOutcome {
    /// No latchup, or no strategy supplied
    #[default]
    NotAttempted,
    /// Strategy ran and reported success
    Recovered,
    /// Strategy ran and failed
    Failed(String),
}

impl RecoveryOutcome {
    pub fn attempted(&self) -> bool {
        !matches!(self, RecoveryOutcome::NotAttempted)
    }
}

/// Brings the camera back into a usable state after latchup
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    async fn reinitialize(&self, camera: &mut CameraSession) -> Result<()>;
}

/// Reboot (optionally) and repeat the initialization sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reinitialize {
    pub reboot: bool,
    pub binning: i64,
    pub setpoint_c: f64,
}

impl Reinitialize {
    pub fn new(binning: i64, setpoint_c: f64) -> Self {
        Self {
            reboot: true,
            binning,
            setpoint_c,
        }
    }

    pub fn without_reboot(mut self) -> Self {
        self.reboot = false;
        self
    }
}

#[async_trait]
impl RecoveryStrategy for Reinitialize {
    async fn reinitialize(&self, camera: &mut CameraSession) -> Result<()> {
        camera
            .initialize(self.reboot, self.binning, self.setpoint_c)
            .await
    }
}

/// Run `strategy` once, bracketed by recovery events
#[instrument(skip_all)]
pub(crate) async fn recover(
    strategy: Arc<dyn RecoveryStrategy>,
    camera: &mut CameraSession,
) -> RecoveryOutcome {
    let sink = camera.event_sink();
    sink.emit(CameraEvent::RecoveryStarted);

    match strategy.reinitialize(camera).await {
        Ok(()) => {
            info!("Camera reinitialized after latchup");
            sink.emit(CameraEvent::RecoveryFinished {
                success: true,
                detail: None,
            });
            RecoveryOutcome::Recovered
        }
        Err(e) => {
            warn!(error = %e, "Latchup recovery failed");
            sink.emit(CameraEvent::RecoveryFinished {
                success: false,
                detail: Some(e.to_string()),
            });
            RecoveryOutcome::Failed(e.to_string())
        }
    }
}
