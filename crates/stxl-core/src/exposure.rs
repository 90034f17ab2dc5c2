//! Exposure requests, results and state machine
//!
//! One exposure walks a fixed path:
//!
//! ```text
//! Idle -> ShutterSet -> Integrating -> Readout -> TempCheck -> Done
//!                                                          \-> Latchup
//! ```
//!
//! The sequencing itself lives in [`CameraSession::take_exposure`]; this module
//! holds the types and enforces the legal transitions.
//!
//! [`CameraSession::take_exposure`]: crate::session::CameraSession::take_exposure

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{CameraError, Result};
use crate::events::{CameraEvent, EventSink};
use crate::latchup::{LatchupEvent, RecoveryOutcome, RecoveryStrategy};

/// Exposure state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExposureState {
    Idle,
    ShutterSet,
    Integrating,
    Readout,
    TempCheck,
    Done,
    Latchup,
}

impl ExposureState {
    pub fn can_transition_to(&self, next: ExposureState) -> bool {
        use ExposureState::*;
        matches!(
            (self, next),
            (Idle, ShutterSet)
                | (ShutterSet, Integrating)
                | (Integrating, Readout)
                | (Readout, TempCheck)
                | (TempCheck, Done)
                | (TempCheck, Latchup)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExposureState::Done | ExposureState::Latchup)
    }
}

impl fmt::Display for ExposureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExposureState::Idle => "IDLE",
            ExposureState::ShutterSet => "SHUTTER_SET",
            ExposureState::Integrating => "INTEGRATING",
            ExposureState::Readout => "READOUT",
            ExposureState::TempCheck => "TEMP_CHECK",
            ExposureState::Done => "DONE",
            ExposureState::Latchup => "LATCHUP",
        };
        f.write_str(name)
    }
}

/// Tracks one exposure's state and reports every move
pub(crate) struct ExposureMachine {
    state: ExposureState,
    sink: Arc<dyn EventSink>,
}

impl ExposureMachine {
    pub(crate) fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: ExposureState::Idle,
            sink,
        }
    }

    pub(crate) fn state(&self) -> ExposureState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: ExposureState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(CameraError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.sink.emit(CameraEvent::ExposureTransition {
            from: self.state.to_string(),
            to: next.to_string(),
        });
        self.state = next;
        Ok(())
    }
}

/// Parameters for one exposure; consumed by `take_exposure`
#[derive(Clone)]
pub struct ExposureRequest {
    exptime: Duration,
    shutter_open: bool,
    destination: PathBuf,
    recovery: Option<Arc<dyn RecoveryStrategy>>,
}

impl ExposureRequest {
    /// Light frame of `exptime_secs` seconds saved to `destination`.
    ///
    /// Zero is a valid exposure time (bias frames).
    pub fn new(exptime_secs: f64, destination: impl Into<PathBuf>) -> Result<Self> {
        if !exptime_secs.is_finite() || exptime_secs < 0.0 {
            return Err(CameraError::InvalidRequest(format!(
                "exposure time must be finite and >= 0, got {}",
                exptime_secs
            )));
        }
        let exptime = Duration::try_from_secs_f64(exptime_secs).map_err(|e| {
            CameraError::InvalidRequest(format!("exposure time {}: {}", exptime_secs, e))
        })?;
        Ok(Self {
            exptime,
            shutter_open: true,
            destination: destination.into(),
            recovery: None,
        })
    }

    /// Keep the shutter closed (dark and bias frames)
    pub fn shutter_closed(mut self) -> Self {
        self.shutter_open = false;
        self
    }

    /// Run `strategy` once if this exposure ends in latchup
    pub fn with_recovery(mut self, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.recovery = Some(strategy);
        self
    }

    pub fn exptime(&self) -> Duration {
        self.exptime
    }

    pub fn shutter_open(&self) -> bool {
        self.shutter_open
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn recovery(&self) -> Option<&Arc<dyn RecoveryStrategy>> {
        self.recovery.as_ref()
    }

    /// Camera image type: 1 = light (shutter open), 0 = dark
    pub(crate) fn image_type(&self) -> u8 {
        u8::from(self.shutter_open)
    }
}

impl fmt::Debug for ExposureRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposureRequest")
            .field("exptime", &self.exptime)
            .field("shutter_open", &self.shutter_open)
            .field("destination", &self.destination)
            .field("recovery", &self.recovery.is_some())
            .finish()
    }
}

/// Temperature and cooler power at one status poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub temperature_c: f64,
    pub cooler_power_pct: f64,
}

impl TelemetrySample {
    pub fn new(temperature_c: f64, cooler_power_pct: f64) -> Self {
        Self {
            temperature_c,
            cooler_power_pct,
        }
    }
}

/// Minimum, median and maximum of a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

impl Range {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = values.collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        Some(Self {
            min: sorted[0],
            median,
            max: sorted[n - 1],
        })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}/{:.1}/{:.1}", self.min, self.median, self.max)
    }
}

/// Status history sampled while an exposure ran
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    samples: Vec<TelemetrySample>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: TelemetrySample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[TelemetrySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent sample, i.e. the reading at capture time
    pub fn last(&self) -> Option<TelemetrySample> {
        self.samples.last().copied()
    }

    pub fn temperature(&self) -> Option<Range> {
        Range::of(self.samples.iter().map(|s| s.temperature_c))
    }

    pub fn cooler_power(&self) -> Option<Range> {
        Range::of(self.samples.iter().map(|s| s.cooler_power_pct))
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.temperature(), self.cooler_power()) {
            (Some(t), Some(p)) => write!(f, "T {}C PWR {}%", t, p),
            _ => f.write_str("no telemetry"),
        }
    }
}

/// Image bytes as produced by the camera plus capture metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub data: Bytes,
    pub started_at: DateTime<Utc>,
    pub exptime: Duration,
    pub shutter_open: bool,
    pub temperature_c: Option<f64>,
    pub cooler_power_pct: Option<f64>,
    pub binning: Option<i64>,
    pub filter: Option<i64>,
}

/// Outcome of one `take_exposure` call
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureResult {
    pub success: bool,
    pub state: ExposureState,
    /// Present only when the exposure reached `Done`
    pub frame: Option<Frame>,
    pub telemetry: Telemetry,
    pub latchup: Option<LatchupEvent>,
    pub recovery: RecoveryOutcome,
}

impl ExposureResult {
    pub fn latchup_detected(&self) -> bool {
        self.latchup.is_some()
    }
}
