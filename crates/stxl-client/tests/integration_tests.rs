//! Integration tests for stxl-client
//!
//! These tests serve the simulated camera's web pages over real HTTP and
//! drive a full `CameraSession` through `HttpTransport`.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use stxl_client::testing::{SimulatedCamera, TestServer};
use stxl_client::HttpTransport;
use stxl_core::transport::mock::{FilterSettle, MockTransportAdapter, ScriptedStatus};
use stxl_core::{
    CameraConfig, CameraError, CameraEvent, CameraSession, CcdState, Endpoint, EventSink,
    ExposureRequest, ExposureState, FanoutSink, FileImageStore, RecordingSink, RecoveryOutcome,
    Reinitialize, SettingKey, SettingValue, TracingSink, TransportAdapter, TransportError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

struct Harness {
    // Keeps the server alive for the test's duration
    _server: TestServer,
    mock: Arc<MockTransportAdapter>,
    sink: Arc<RecordingSink>,
    session: CameraSession,
}

async fn harness() -> anyhow::Result<Harness> {
    init_tracing();
    let camera = SimulatedCamera::new();
    let server = TestServer::start(camera.router()).await?;

    let mut config = CameraConfig::builder(server.base_url())
        .poll_interval(Duration::from_millis(20))
        .settle_timeout(Duration::from_millis(300))
        .readout_margin(Duration::from_secs(2))
        .reboot_settle(Duration::from_millis(100))
        .cooldown(false)
        .build();
    config.connection = server.connection();

    let transport = Arc::new(HttpTransport::from_config(&config.connection)?);
    let sink = RecordingSink::new();
    // Events still reach the log while the test inspects them
    let sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink), sink.clone()];
    let events = FanoutSink::new(sinks);
    let session = CameraSession::new(transport, config).with_event_sink(Arc::new(events));

    Ok(Harness {
        _server: server,
        mock: camera.mock(),
        sink,
        session,
    })
}

// =============================================================================
// Device info and setup
// =============================================================================

#[tokio::test]
async fn test_connect_reads_index_and_setup() -> anyhow::Result<()> {
    let mut h = harness().await?;

    h.session.connect().await?;

    assert_eq!(h.session.info()["Camera Model"], "STXL-6303E");
    assert_eq!(h.session.info()["Firmware Version"], "1.25");
    assert_eq!(
        h.session.register().last_known(SettingKey::CcdTemperatureSetpoint),
        Some(SettingValue::Float(15.0))
    );
    assert_eq!(
        h.session.register().last_known(SettingKey::Filter),
        Some(SettingValue::Integer(1))
    );
    Ok(())
}

#[tokio::test]
async fn test_initialize_round_trips_through_setup_form() -> anyhow::Result<()> {
    let mut h = harness().await?;

    h.session.initialize(false, 2, -5.0).await?;

    assert_eq!(h.mock.setup_value("Bin").as_deref(), Some("2"));
    assert_eq!(h.mock.setup_value("CCDTemperatureSetpoint").as_deref(), Some("-5.0"));
    assert_eq!(h.mock.setup_value("Fan").as_deref(), Some("2"));
    // Fields the driver does not touch are resubmitted unchanged
    assert_eq!(h.mock.setup_value("ReadoutMode").as_deref(), Some("0"));
    assert_eq!(
        h.session.register().last_known(SettingKey::CoolerState),
        Some(SettingValue::Integer(1))
    );
    Ok(())
}

#[tokio::test]
async fn test_initialize_mismatch_is_configuration_error() -> anyhow::Result<()> {
    let mut h = harness().await?;
    h.mock.set_readback("Bin", "1");

    let err = h.session.initialize(false, 3, 0.0).await.unwrap_err();

    assert!(matches!(err, CameraError::Configuration { .. }));
    assert_eq!(err.mismatches()[0].key, SettingKey::Bin);
    assert_eq!(
        h.sink.count(|e| matches!(e, CameraEvent::WriteMismatch { tolerated: false, .. })),
        1
    );
    Ok(())
}

#[tokio::test]
async fn test_fan_mismatch_is_tolerated() -> anyhow::Result<()> {
    let mut h = harness().await?;
    h.mock.set_readback("Fan", "1");

    h.session.initialize(false, 1, 10.0).await?;

    assert_eq!(
        h.sink.count(|e| matches!(e, CameraEvent::WriteMismatch { tolerated: true, .. })),
        1
    );
    Ok(())
}

// =============================================================================
// Exposures
// =============================================================================

#[tokio::test]
async fn test_zero_exposure_saves_camera_bytes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut h = harness().await?;
    h.session = h.session.with_image_store(Arc::new(FileImageStore));
    h.mock.set_image(&b"SIMPLE  =                    T / test frame"[..]);
    h.session.initialize(false, 1, 15.0).await?;

    let path = dir.path().join("data").join("zero_000.fits");
    let request = ExposureRequest::new(0.0, &path)?.shutter_closed();
    let result = h.session.take_exposure(request).await?;

    assert_eq!(result.state, ExposureState::Done);
    assert_eq!(
        std::fs::read(&path)?,
        b"SIMPLE  =                    T / test frame".to_vec()
    );

    let exposures = h.mock.exposures();
    let start = &exposures[0];
    let field = |name: &str| {
        start
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    };
    assert_eq!(field("ImageType").as_deref(), Some("0"));
    assert_eq!(field("Contrast").as_deref(), Some("1"));
    assert_eq!(field("ExposureTime").as_deref(), Some("0.0"));
    assert!(field("DateTime").is_some_and(|t| t.contains('T')));
    Ok(())
}

#[tokio::test]
async fn test_exposure_polls_until_ccd_idle() -> anyhow::Result<()> {
    let mut h = harness().await?;
    h.session = h
        .session
        .with_image_store(Arc::new(stxl_core::MemoryImageStore::new()));
    h.mock.set_exposing_polls(3);

    let result = h
        .session
        .take_exposure(ExposureRequest::new(0.05, "light.fits")?)
        .await?;

    assert!(result.success);
    assert_eq!(result.telemetry.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_latchup_recovers_with_reboot() -> anyhow::Result<()> {
    let mut h = harness().await?;
    h.session.initialize(false, 1, 15.0).await?;
    h.mock.push_status([ScriptedStatus::new(31.0, 100.0)]);

    let request = ExposureRequest::new(0.0, "x.fits")?
        .with_recovery(Arc::new(Reinitialize::new(1, 15.0)));
    let result = h.session.take_exposure(request).await?;

    assert_eq!(result.state, ExposureState::Latchup);
    assert!(result.latchup_detected());
    assert!(result.frame.is_none());
    assert_eq!(result.recovery, RecoveryOutcome::Recovered);
    assert_eq!(h.mock.reboots(), 1);
    assert_eq!(h.mock.setup_value("CoolerState").as_deref(), Some("1"));
    assert_eq!(h.sink.count(|e| *e == CameraEvent::RecoveryStarted), 1);
    Ok(())
}

#[tokio::test]
async fn test_abort() -> anyhow::Result<()> {
    let h = harness().await?;

    h.session.abort_exposure().await?;

    assert_eq!(h.mock.request_count(Endpoint::ExposureAbort), 1);
    Ok(())
}

// =============================================================================
// Filter wheel
// =============================================================================

#[tokio::test]
async fn test_set_filter_waits_and_verifies() -> anyhow::Result<()> {
    let mut h = harness().await?;
    h.mock.set_filter_settle(FilterSettle::AfterPolls(2));

    h.session.set_filter(3).await?;

    assert_eq!(h.mock.filter_position(), 3);
    assert_eq!(h.session.current_filter().await?, "Green");
    assert_eq!(h.session.filter_names().await?.len(), 8);
    Ok(())
}

#[tokio::test]
async fn test_set_filter_timeout_keeps_verified_position() -> anyhow::Result<()> {
    let mut h = harness().await?;
    h.session.set_filter(2).await?;
    h.mock.set_filter_settle(FilterSettle::Never);

    let err = h.session.set_filter(3).await.unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    assert_eq!(
        h.session.register().last_known(SettingKey::Filter),
        Some(SettingValue::Integer(2))
    );
    Ok(())
}

// =============================================================================
// Transport behavior
// =============================================================================

#[tokio::test]
async fn test_status_over_api_endpoints() -> anyhow::Result<()> {
    let h = harness().await?;
    h.mock.push_status([ScriptedStatus::new(-4.25, 63.0)]);

    let status = h.session.read_status().await?;

    assert_eq!(status.temperature_c, Some(-4.25));
    assert_eq!(status.cooler_power_pct, Some(63.0));
    assert_eq!(status.ccd_state, Some(CcdState::Idle));
    Ok(())
}

#[tokio::test]
async fn test_camera_error_status_is_http_error() -> anyhow::Result<()> {
    let camera = SimulatedCamera::new();
    let server = TestServer::start(camera.router()).await?;
    let transport = server.transport()?;
    camera.mock().set_connected(false);

    let result = transport.request(Endpoint::SetupRead, &[]).await;

    assert!(matches!(
        result,
        Err(TransportError::Http { status: 503, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_camera_is_connection_failure() -> anyhow::Result<()> {
    // Reserve a port, then free it so nothing is listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let transport = HttpTransport::new(&format!("http://{}", addr))?;
    let result = transport.request(Endpoint::DeviceInfo, &[]).await;

    assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    Ok(())
}

#[tokio::test]
async fn test_reboot_request_times_out_and_resets_forms() -> anyhow::Result<()> {
    let camera = SimulatedCamera::new();
    let server = TestServer::start(camera.router()).await?;
    let transport = server.transport()?;

    let result = transport.request(Endpoint::Reboot, &[]).await;

    assert!(matches!(result, Err(TransportError::Timeout(_))));
    assert_eq!(camera.mock().reboots(), 1);
    // Next write re-reads the setup form instead of reusing the stale copy
    transport
        .request(Endpoint::SetupWrite, &[("Bin".into(), "2".into())])
        .await?;
    assert_eq!(camera.mock().request_count(Endpoint::SetupRead), 1);
    Ok(())
}
