//! Camera session
//!
//! [`CameraSession`] binds one camera address to one transport, one
//! configuration register and one event sink. It is the entry point for the
//! caller-facing operations: `initialize`, `take_exposure` and `set_filter`.
//!
//! Mutating operations take `&mut self`; a session drives a single camera
//! sequentially and cannot be shared between concurrent callers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::events::{CameraEvent, EventSink, TracingSink};
use crate::exposure::{
    ExposureMachine, ExposureRequest, ExposureResult, ExposureState, Frame, Telemetry,
    TelemetrySample,
};
use crate::filter::FilterWheel;
use crate::latchup::{self, LatchupDetector, RecoveryOutcome};
use crate::poll::poll_until;
use crate::protocol::WriteVerify;
use crate::register::ConfigurationRegister;
use crate::schema::{tolerant_keys, SettingKey};
use crate::status::{CcdState, StatusField, StatusSnapshot};
use crate::store::{FileImageStore, ImageStore};
use crate::transport::{read_params, Endpoint, Params, TransportAdapter};
use crate::value::SettingValue;

/// Handle to one camera
pub struct CameraSession {
    transport: Arc<dyn TransportAdapter>,
    register: ConfigurationRegister,
    protocol: WriteVerify,
    filter_wheel: FilterWheel,
    detector: LatchupDetector,
    config: CameraConfig,
    sink: Arc<dyn EventSink>,
    store: Arc<dyn ImageStore>,
    info: BTreeMap<String, String>,
}

impl CameraSession {
    /// Create a session logging events to `tracing` and saving frames to disk
    pub fn new(transport: Arc<dyn TransportAdapter>, config: CameraConfig) -> Self {
        let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
        let protocol = WriteVerify::new(sink.clone());
        Self {
            register: ConfigurationRegister::new(transport.clone()),
            filter_wheel: FilterWheel::new(transport.clone(), protocol.clone(), config.polling.settle()),
            detector: LatchupDetector::from(&config.latchup),
            protocol,
            transport,
            config,
            sink,
            store: Arc::new(FileImageStore),
            info: BTreeMap::new(),
        }
    }

    /// Route camera events to `sink` instead of `tracing`
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.protocol = WriteVerify::new(sink.clone());
        self.filter_wheel = FilterWheel::new(
            self.transport.clone(),
            self.protocol.clone(),
            self.config.polling.settle(),
        );
        self.sink = sink;
        self
    }

    pub fn with_image_store(mut self, store: Arc<dyn ImageStore>) -> Self {
        self.store = store;
        self
    }

    pub fn address(&self) -> String {
        self.transport.address()
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn register(&self) -> &ConfigurationRegister {
        &self.register
    }

    pub fn event_sink(&self) -> Arc<dyn EventSink> {
        self.sink.clone()
    }

    /// Device properties from the last `connect` or reboot
    pub fn info(&self) -> &BTreeMap<String, String> {
        &self.info
    }

    /// Read device info and the current settings
    #[instrument(skip(self), fields(address = %self.transport.address()))]
    pub async fn connect(&mut self) -> Result<()> {
        self.read_info().await?;
        self.register.read(&SettingKey::ALL).await?;
        info!(
            model = self.info.get("Camera Model").map(String::as_str),
            "Connected to camera"
        );
        Ok(())
    }

    /// Read the camera's device properties
    pub async fn read_info(&mut self) -> Result<&BTreeMap<String, String>> {
        let reply = self.transport.request(Endpoint::DeviceInfo, &[]).await?;
        self.info = reply.into_fields();
        Ok(&self.info)
    }

    /// Bring the camera into a known state.
    ///
    /// Optionally reboots first, then writes binning, setpoint and cooler/fan
    /// settings in one write-verify cycle, then (if configured) waits for the
    /// CCD to reach the setpoint.
    #[instrument(skip(self))]
    pub async fn initialize(&mut self, reboot: bool, binning: i64, setpoint_c: f64) -> Result<()> {
        if reboot {
            self.reboot().await?;
        }

        let settings = BTreeMap::from([
            (SettingKey::Bin, SettingValue::Integer(binning)),
            (SettingKey::CcdTemperatureSetpoint, SettingValue::Float(setpoint_c)),
            (SettingKey::CoolerState, SettingValue::Integer(1)),
            // Manual fan at 50%
            (SettingKey::Fan, SettingValue::Integer(2)),
            (SettingKey::FanSetpoint, SettingValue::Float(50.0)),
        ]);
        self.protocol
            .apply(&mut self.register, &settings, &tolerant_keys())
            .await?;
        info!(binning, setpoint_c, "Camera initialized");

        if self.config.cooldown.enabled {
            self.wait_for_cooldown(setpoint_c).await?;
        }
        Ok(())
    }

    /// Write arbitrary schema settings through the write-verify protocol
    pub async fn apply_settings(
        &mut self,
        settings: &BTreeMap<SettingKey, SettingValue>,
    ) -> Result<()> {
        self.protocol
            .apply(&mut self.register, settings, &tolerant_keys())
            .await
    }

    /// Reboot the camera and wait for it to come back.
    ///
    /// The camera drops the reboot request instead of answering it, so a
    /// transport error here is expected and ignored.
    #[instrument(skip(self))]
    pub async fn reboot(&mut self) -> Result<()> {
        self.sink.emit(CameraEvent::Rebooted);
        match self.transport.request(Endpoint::Reboot, &[]).await {
            Ok(_) => debug!("Reboot request answered"),
            Err(e) => debug!(error = %e, "Reboot request dropped"),
        }
        self.register.invalidate();

        tokio::time::sleep(Duration::from_millis(self.config.reboot.settle_ms)).await;
        self.read_info().await?;
        info!("Camera back after reboot");
        Ok(())
    }

    /// Wait until the running mean temperature is within tolerance of setpoint
    async fn wait_for_cooldown(&self, setpoint_c: f64) -> Result<()> {
        let cooldown = &self.config.cooldown;
        let window = cooldown.samples.max(1);
        let tolerance = cooldown.tolerance_c;
        let transport = &self.transport;
        let params = read_params([StatusField::CcdTemperature.wire_name()]);
        let params = &params;
        let history = Mutex::new(Vec::<f64>::new());
        let history = &history;

        info!(setpoint_c, "Waiting for cooldown");
        let mean = poll_until("cooldown", cooldown.poll(), move || async move {
            let reply = transport.request(Endpoint::Status, params).await?;
            let temperature = StatusSnapshot::from_reply(&reply)?.temperature()?;

            let mut history = history.lock();
            history.push(temperature);
            if history.len() < window {
                return Ok(None);
            }
            let recent = &history[history.len() - window..];
            let mean = recent.iter().sum::<f64>() / window as f64;
            debug!(temperature, mean, "Cooling");
            Ok(((mean - setpoint_c).abs() < tolerance).then_some(mean))
        })
        .await?;

        info!(mean, "Reached setpoint");
        Ok(())
    }

    /// Take one exposure.
    ///
    /// Latchup is reported in the result, not as an error. Transport
    /// failures, timeouts and storage failures are errors.
    #[instrument(skip(self), fields(exptime = ?request.exptime()))]
    pub async fn take_exposure(&mut self, request: ExposureRequest) -> Result<ExposureResult> {
        let mut machine = ExposureMachine::new(self.sink.clone());
        let setpoint_c = self.setpoint().await?;

        // The shutter travels with the start request as the image type
        let started_at = Utc::now();
        let params = start_params(&request, started_at);
        machine.advance(ExposureState::ShutterSet)?;

        self.transport
            .request(Endpoint::ExposureStart, &params)
            .await?;
        machine.advance(ExposureState::Integrating)?;

        let telemetry = self.monitor_exposure(request.exptime()).await?;
        machine.advance(ExposureState::Readout)?;

        let data = self.transport.download(Endpoint::Image).await?;
        machine.advance(ExposureState::TempCheck)?;
        info!(%telemetry, bytes = data.len(), "Exposure read out");

        if let Some(event) = self.detector.detect(telemetry.samples(), setpoint_c) {
            self.sink.emit(event.into());
            machine.advance(ExposureState::Latchup)?;

            let recovery = match request.recovery().cloned() {
                Some(strategy) => latchup::recover(strategy, self).await,
                None => {
                    warn!("Latchup detected and no recovery strategy supplied");
                    RecoveryOutcome::NotAttempted
                }
            };
            return Ok(ExposureResult {
                success: false,
                state: machine.state(),
                frame: None,
                telemetry,
                latchup: Some(event),
                recovery,
            });
        }

        machine.advance(ExposureState::Done)?;
        let last = telemetry.last();
        let frame = Frame {
            data,
            started_at,
            exptime: request.exptime(),
            shutter_open: request.shutter_open(),
            temperature_c: last.map(|s| s.temperature_c),
            cooler_power_pct: last.map(|s| s.cooler_power_pct),
            binning: self.known_integer(SettingKey::Bin),
            filter: self.known_integer(SettingKey::Filter),
        };
        self.store.save(request.destination(), &frame).await?;
        info!(destination = %request.destination().display(), "Exposure saved");

        Ok(ExposureResult {
            success: true,
            state: machine.state(),
            frame: Some(frame),
            telemetry,
            latchup: None,
            recovery: RecoveryOutcome::NotAttempted,
        })
    }

    /// Poll status until the CCD goes idle, recording every sample
    async fn monitor_exposure(&self, exptime: Duration) -> Result<Telemetry> {
        let transport = &self.transport;
        let params = read_params([
            StatusField::CcdTemperature.wire_name(),
            StatusField::CoolerPower.wire_name(),
            StatusField::CcdState.wire_name(),
        ]);
        let params = &params;
        let telemetry = Mutex::new(Telemetry::new());
        let samples = &telemetry;

        poll_until(
            "exposure completion",
            self.config.polling.exposure(exptime),
            move || async move {
                let reply = transport.request(Endpoint::Status, params).await?;
                let status = StatusSnapshot::from_reply(&reply)?;
                samples.lock().push(TelemetrySample::new(
                    status.temperature()?,
                    status.cooler_power()?,
                ));

                match status.ccd()? {
                    CcdState::Idle => Ok(Some(())),
                    state => {
                        debug!(?state, "Exposure in progress");
                        Ok(None)
                    }
                }
            },
        )
        .await?;

        Ok(telemetry.into_inner())
    }

    /// Setpoint from the register, reading it from the camera if unknown
    async fn setpoint(&mut self) -> Result<f64> {
        let key = SettingKey::CcdTemperatureSetpoint;
        if let Some(value) = self.register.last_known(key) {
            return Ok(value.as_f64());
        }
        let values = self.register.read(&[key]).await?;
        values
            .get(&key)
            .map(SettingValue::as_f64)
            .ok_or_else(|| CameraError::InvalidResponse("setpoint missing from read".into()))
    }

    fn known_integer(&self, key: SettingKey) -> Option<i64> {
        self.register.last_known(key).and_then(|v| v.as_i64())
    }

    /// Abort the exposure in progress, if any
    #[instrument(skip(self))]
    pub async fn abort_exposure(&self) -> Result<()> {
        self.transport
            .request(Endpoint::ExposureAbort, &[])
            .await?;
        info!("Exposure aborted");
        Ok(())
    }

    /// Move the filter wheel and verify the new position
    pub async fn set_filter(&mut self, position: i64) -> Result<()> {
        self.filter_wheel
            .set_filter(&mut self.register, position)
            .await
    }

    /// Names of the filters in slot order
    pub async fn filter_names(&self) -> Result<Vec<String>> {
        self.filter_wheel.names().await
    }

    /// Name of the filter currently in the beam
    pub async fn current_filter(&mut self) -> Result<String> {
        let values = self.register.read(&[SettingKey::Filter]).await?;
        let position = values
            .get(&SettingKey::Filter)
            .and_then(SettingValue::as_i64)
            .ok_or_else(|| CameraError::InvalidResponse("filter position missing".into()))?;

        let names = self.filter_names().await?;
        usize::try_from(position - 1)
            .ok()
            .and_then(|i| names.get(i).cloned())
            .ok_or_else(|| {
                CameraError::InvalidResponse(format!("filter position {} has no name", position))
            })
    }

    /// Current temperature, cooler power, CCD and filter wheel state
    pub async fn read_status(&self) -> Result<StatusSnapshot> {
        let params = read_params([
            StatusField::CcdTemperature.wire_name(),
            StatusField::CoolerPower.wire_name(),
            StatusField::CcdState.wire_name(),
            StatusField::FilterState.wire_name(),
        ]);
        let reply = self.transport.request(Endpoint::Status, &params).await?;
        StatusSnapshot::from_reply(&reply)
    }
}

/// Exposure start parameters: time, image type, manual contrast and the UTC
/// start time at millisecond precision
fn start_params(request: &ExposureRequest, started_at: DateTime<Utc>) -> Params {
    vec![
        (
            "ExposureTime".to_string(),
            SettingValue::Float(request.exptime().as_secs_f64()).to_string(),
        ),
        ("ImageType".to_string(), request.image_type().to_string()),
        ("Contrast".to_string(), "1".to_string()),
        (
            "DateTime".to_string(),
            started_at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    use crate::events::{RecordingSink, Severity};
    use crate::latchup::{Reinitialize, RecoveryStrategy};
    use crate::store::MemoryImageStore;
    use crate::transport::mock::{FilterSettle, MockTransportAdapter, ScriptedStatus};

    struct Fixture {
        mock: Arc<MockTransportAdapter>,
        sink: Arc<RecordingSink>,
        store: Arc<MemoryImageStore>,
        session: CameraSession,
    }

    fn fixture_with(config: CameraConfig) -> Fixture {
        let mock = Arc::new(MockTransportAdapter::new());
        let sink = RecordingSink::new();
        let store = Arc::new(MemoryImageStore::new());
        let session = CameraSession::new(mock.clone(), config)
            .with_event_sink(sink.clone())
            .with_image_store(store.clone());
        Fixture {
            mock,
            sink,
            store,
            session,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(CameraConfig::builder("mock://stxl").cooldown(false).build())
    }

    #[derive(Default)]
    struct CountingRecovery {
        calls: AtomicU32,
    }

    #[async_trait]
    impl RecoveryStrategy for CountingRecovery {
        async fn reinitialize(&self, _camera: &mut CameraSession) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingRecovery;

    #[async_trait]
    impl RecoveryStrategy for FailingRecovery {
        async fn reinitialize(&self, _camera: &mut CameraSession) -> Result<()> {
            Err(CameraError::InvalidResponse("camera unreachable".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_exptime_dark_reaches_done_without_delay() {
        let mut f = fixture();
        f.session.initialize(false, 1, 15.0).await.unwrap();
        let start = Instant::now();

        let request = ExposureRequest::new(0.0, "data/zero_000.fits")
            .unwrap()
            .shutter_closed();
        let result = f.session.take_exposure(request).await.unwrap();

        assert_eq!(result.state, ExposureState::Done);
        assert!(result.success);
        assert!(!result.latchup_detected());
        assert_eq!(start.elapsed(), Duration::ZERO);

        let frame = result.frame.unwrap();
        assert!(!frame.shutter_open);
        assert_eq!(frame.binning, Some(1));
        assert_eq!(f.store.get("data/zero_000.fits").unwrap().data, frame.data);

        let exposures = f.mock.exposures();
        let start = &exposures[0];
        assert_eq!(start[0], ("ExposureTime".to_string(), "0.0".to_string()));
        assert_eq!(start[1], ("ImageType".to_string(), "0".to_string()));
        assert_eq!(start[2], ("Contrast".to_string(), "1".to_string()));
        assert_eq!(start[3].0, "DateTime");
        assert_eq!(start[3].1.len(), "2026-01-01T00:00:00.000".len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hot_and_saturated_is_latchup_with_one_recovery() {
        let mut f = fixture();
        f.session.initialize(false, 1, 15.0).await.unwrap();
        f.mock.push_status([ScriptedStatus::new(30.0, 100.0)]);
        f.mock.set_exposing_polls(2);
        let recovery = Arc::new(CountingRecovery::default());

        let request = ExposureRequest::new(1.0, "light.fits")
            .unwrap()
            .with_recovery(recovery.clone());
        let result = f.session.take_exposure(request).await.unwrap();

        assert_eq!(result.state, ExposureState::Latchup);
        assert!(!result.success);
        assert!(result.latchup_detected());
        assert!(result.frame.is_none());
        assert_eq!(result.recovery, RecoveryOutcome::Recovered);
        assert_eq!(recovery.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.telemetry.len(), 3);
        assert!(f.store.is_empty());

        assert_eq!(
            f.sink
                .count(|e| matches!(e, CameraEvent::LatchupDetected { .. })),
            1
        );
        assert_eq!(f.sink.count(|e| *e == CameraEvent::RecoveryStarted), 1);
        assert_eq!(
            f.sink.count(|e| matches!(
                e,
                CameraEvent::RecoveryFinished { success: true, .. }
            )),
            1
        );
        assert_eq!(f.mock.exposures().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_near_setpoint_normal_power_is_done() {
        let mut f = fixture();
        f.session.initialize(false, 2, 15.0).await.unwrap();
        f.mock.push_status([ScriptedStatus::new(17.0, 40.0)]);
        let recovery = Arc::new(CountingRecovery::default());

        let request = ExposureRequest::new(5.0, "light.fits")
            .unwrap()
            .with_recovery(recovery.clone());
        let result = f.session.take_exposure(request).await.unwrap();

        assert_eq!(result.state, ExposureState::Done);
        assert!(result.success);
        assert_eq!(recovery.calls.load(Ordering::SeqCst), 0);
        let frame = result.frame.unwrap();
        assert_eq!(frame.temperature_c, Some(17.0));
        assert_eq!(frame.cooler_power_pct, Some(40.0));
        assert_eq!(frame.binning, Some(2));
        assert_eq!(f.sink.count(|e| e.severity() >= Severity::Warning), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latchup_without_strategy_is_not_recovered() {
        let mut f = fixture();
        // Setpoint comes from the camera (15.0) when the register is empty
        f.mock.push_status([ScriptedStatus::new(30.0, 100.0)]);

        let request = ExposureRequest::new(0.0, "x.fits").unwrap();
        let result = f.session.take_exposure(request).await.unwrap();

        assert_eq!(result.state, ExposureState::Latchup);
        assert_eq!(result.recovery, RecoveryOutcome::NotAttempted);
        assert_eq!(f.sink.count(|e| *e == CameraEvent::RecoveryStarted), 0);
        assert_eq!(result.latchup.unwrap().setpoint_c, 15.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_recovery_is_reported() {
        let mut f = fixture();
        f.mock.push_status([ScriptedStatus::new(30.0, 100.0)]);

        let request = ExposureRequest::new(0.0, "x.fits")
            .unwrap()
            .with_recovery(Arc::new(FailingRecovery));
        let result = f.session.take_exposure(request).await.unwrap();

        assert!(matches!(result.recovery, RecoveryOutcome::Failed(_)));
        assert_eq!(
            f.sink.count(|e| matches!(
                e,
                CameraEvent::RecoveryFinished { success: false, .. }
            )),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinitialize_strategy_reboots_and_rewrites() {
        let mut f = fixture();
        f.session.initialize(false, 2, -5.0).await.unwrap();
        f.mock.push_status([ScriptedStatus::new(20.0, 100.0)]);

        let request = ExposureRequest::new(0.0, "x.fits")
            .unwrap()
            .with_recovery(Arc::new(Reinitialize::new(2, -5.0)));
        let result = f.session.take_exposure(request).await.unwrap();

        assert_eq!(result.recovery, RecoveryOutcome::Recovered);
        assert_eq!(f.mock.reboots(), 1);
        assert_eq!(f.mock.setup_value("Bin").as_deref(), Some("2"));
        assert_eq!(
            f.session.register().last_known(SettingKey::CcdTemperatureSetpoint),
            Some(SettingValue::Float(-5.0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exposure_waits_for_ccd_idle() {
        let mut f = fixture();
        f.mock.set_exposing_polls(3);
        let start = Instant::now();

        let request = ExposureRequest::new(2.0, "x.fits").unwrap();
        let result = f.session.take_exposure(request).await.unwrap();

        assert!(result.success);
        assert_eq!(result.telemetry.len(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exposure_timeout_is_bounded_by_exptime_plus_margin() {
        let mut f = fixture();
        f.mock.set_exposing_polls(u32::MAX);
        let start = Instant::now();

        let request = ExposureRequest::new(5.0, "x.fits").unwrap();
        let err = f.session.take_exposure(request).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_secs(15));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_surfaced() {
        let mut f = fixture();
        f.mock.set_connected(false);

        let request = ExposureRequest::new(0.0, "x.fits").unwrap();
        let err = f.session.take_exposure(request).await.unwrap_err();

        assert!(matches!(err, CameraError::Transport(_)));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let mut f = fixture();

        f.session.initialize(false, 2, -10.0).await.unwrap();
        let first = f.session.register().snapshot();
        f.session.initialize(false, 2, -10.0).await.unwrap();
        let second = f.session.register().snapshot();

        assert_eq!(first, second);
        assert_eq!(first[&SettingKey::Bin], SettingValue::Integer(2));
        assert_eq!(
            first[&SettingKey::CcdTemperatureSetpoint],
            SettingValue::Float(-10.0)
        );
        assert_eq!(first[&SettingKey::CoolerState], SettingValue::Integer(1));
        assert_eq!(first[&SettingKey::Fan], SettingValue::Integer(2));
    }

    #[tokio::test]
    async fn test_initialize_tolerates_fan_readback() {
        let mut f = fixture();
        f.mock.set_readback("FanSetpoint", "48.0");

        f.session.initialize(false, 1, 0.0).await.unwrap();

        assert_eq!(f.sink.count(|e| e.severity() == Severity::Info), 1);
        assert_eq!(
            f.session.register().last_known(SettingKey::FanSetpoint),
            Some(SettingValue::Float(48.0))
        );
    }

    #[tokio::test]
    async fn test_initialize_fails_on_binning_mismatch() {
        let mut f = fixture();
        f.mock.set_readback("Bin", "1");

        let err = f.session.initialize(false, 3, 0.0).await.unwrap_err();

        assert_eq!(err.mismatches()[0].key, SettingKey::Bin);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_with_reboot() {
        let mut f = fixture();
        f.session.apply_settings(&BTreeMap::from([(SettingKey::Bin, SettingValue::Integer(3))]))
            .await
            .unwrap();
        let start = Instant::now();

        f.session.initialize(true, 2, 10.0).await.unwrap();

        assert_eq!(f.mock.reboots(), 1);
        assert!(start.elapsed() >= Duration::from_millis(f.session.config().reboot.settle_ms));
        assert_eq!(f.session.info()["Camera Model"], "STXL-6303E");
        assert_eq!(f.sink.count(|e| *e == CameraEvent::Rebooted), 1);
        assert_eq!(
            f.session.register().last_known(SettingKey::Bin),
            Some(SettingValue::Integer(2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_waits_for_running_mean() {
        let mut f = fixture_with(CameraConfig::builder("mock://stxl").build());
        f.mock.push_status([
            ScriptedStatus::new(25.0, 100.0),
            ScriptedStatus::new(20.0, 100.0),
            ScriptedStatus::new(16.0, 80.0),
            ScriptedStatus::new(15.0, 60.0),
        ]);
        let start = Instant::now();

        f.session.initialize(false, 1, 15.0).await.unwrap();

        // Three warm samples must leave the ten-sample window first
        assert_eq!(start.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_timeout() {
        let config = CameraConfig::builder("mock://stxl")
            .cooldown_timeout(Duration::from_secs(30))
            .build();
        let mut f = fixture_with(config);
        f.mock.push_status([ScriptedStatus::new(25.0, 100.0)]);

        let err = f.session.initialize(false, 1, 15.0).await.unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_filter_timeout_leaves_previous_position() {
        let mut f = fixture();
        f.session.set_filter(2).await.unwrap();
        f.mock.set_filter_settle(FilterSettle::Never);

        let err = f.session.set_filter(3).await.unwrap_err();

        assert!(matches!(err, CameraError::Timeout { .. }));
        assert_eq!(
            f.session.register().last_known(SettingKey::Filter),
            Some(SettingValue::Integer(2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_records_filter() {
        let mut f = fixture();
        f.session.set_filter(4).await.unwrap();

        let result = f
            .session
            .take_exposure(ExposureRequest::new(0.0, "x.fits").unwrap())
            .await
            .unwrap();

        assert_eq!(result.frame.unwrap().filter, Some(4));
        assert_eq!(f.session.current_filter().await.unwrap(), "Blue");
    }

    #[test]
    fn test_start_params_render_exposure_time_as_float() {
        let started_at = Utc::now();
        let long = ExposureRequest::new(1.5, "x.fits").unwrap();
        let whole = ExposureRequest::new(30.0, "x.fits").unwrap();

        assert_eq!(start_params(&long, started_at)[0].1, "1.5");
        assert_eq!(start_params(&whole, started_at)[0].1, "30.0");
    }

    #[tokio::test]
    async fn test_apply_settings_disables_fan() {
        let mut f = fixture();
        let settings = BTreeMap::from([(SettingKey::Fan, SettingValue::Integer(3))]);

        f.session.apply_settings(&settings).await.unwrap();

        assert_eq!(f.mock.setup_value("Fan").as_deref(), Some("3"));
        assert_eq!(
            f.session.register().last_known(SettingKey::Fan),
            Some(SettingValue::Integer(3))
        );
    }

    #[tokio::test]
    async fn test_connect_reads_info_and_settings() {
        let mut f = fixture();

        f.session.connect().await.unwrap();

        assert_eq!(f.session.info()["Serial Number"], "SIM0001");
        assert_eq!(f.session.register().snapshot().len(), SettingKey::ALL.len());
    }

    #[tokio::test]
    async fn test_abort_and_status() {
        let f = fixture();
        f.session.abort_exposure().await.unwrap();
        let status = f.session.read_status().await.unwrap();

        assert_eq!(f.mock.request_count(Endpoint::ExposureAbort), 1);
        assert_eq!(status.ccd_state, Some(CcdState::Idle));
        assert_eq!(status.temperature_c, Some(15.0));
    }
}
