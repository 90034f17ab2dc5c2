//! Mock transport adapter for testing
//!
//! Simulates the camera's control server in-process: setup form values, a
//! scripted temperature/cooler power sequence, exposure progress, filter
//! wheel motion and reboots. Read-back overrides model firmware that does not
//! keep what was written.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{Endpoint, Params, Reply, TransportAdapter, TransportError};

/// One scripted status sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedStatus {
    pub temperature_c: f64,
    pub cooler_power_pct: f64,
}

impl ScriptedStatus {
    pub fn new(temperature_c: f64, cooler_power_pct: f64) -> Self {
        Self {
            temperature_c,
            cooler_power_pct,
        }
    }
}

/// How the simulated filter wheel finishes a move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSettle {
    /// Reports idle on the first status poll
    Immediate,
    /// Reports moving for this many status polls
    AfterPolls(u32),
    /// Never reports idle
    Never,
    /// Stays idle for `start` after the write, then moves for `travel`;
    /// the previous slot is read back until the move ends
    Delayed { start: Duration, travel: Duration },
}

const DEFAULT_FILTER_NAMES: [&str; 8] = [
    "Luminance", "Red", "Green", "Blue", "Halpha", "OIII", "SII", "Dark",
];

/// Default cooler power when no status script is loaded
const IDLE_COOLER_POWER: f64 = 40.0;

struct MockState {
    setup: BTreeMap<String, String>,
    readback: HashMap<String, String>,
    filter_position: i64,
    filter_names: Vec<String>,
    filter_settle: FilterSettle,
    settle_remaining: u32,
    /// Write time and slot before the move, for `FilterSettle::Delayed`
    filter_move: Option<(Instant, i64)>,
    status_script: VecDeque<ScriptedStatus>,
    current_status: Option<ScriptedStatus>,
    exposing_polls: u32,
    exposing_remaining: u32,
    exposures: Vec<Params>,
    image: Bytes,
    reboots: u32,
    requests: Vec<(Endpoint, Params)>,
}

impl MockState {
    fn power_on_setup() -> BTreeMap<String, String> {
        [
            ("Bin", "1"),
            ("CCDTemperatureSetpoint", "15.0"),
            ("CoolerState", "0"),
            ("Fan", "1"),
            ("FanSetpoint", "0.0"),
            ("ReadoutMode", "0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn reported(&self, name: &str) -> Option<String> {
        if let Some(forced) = self.readback.get(name) {
            return Some(forced.clone());
        }
        if name == "Filter" {
            return Some(self.wheel_position().to_string());
        }
        self.setup.get(name).cloned()
    }

    fn setup_reply(&self, params: &[(String, String)]) -> Reply {
        if params.is_empty() {
            self.setup
                .keys()
                .filter_map(|k| self.reported(k).map(|v| (k.clone(), v)))
                .collect()
        } else {
            params
                .iter()
                .filter(|(name, _)| self.setup.contains_key(name))
                .filter_map(|(name, _)| self.reported(name).map(|v| (name.clone(), v)))
                .collect()
        }
    }

    /// Slot the wheel is physically at
    fn wheel_position(&self) -> i64 {
        match (self.filter_settle, self.filter_move) {
            (FilterSettle::Delayed { start, travel }, Some((written, previous)))
                if written.elapsed() < start + travel =>
            {
                previous
            }
            _ => self.filter_position,
        }
    }

    fn filter_reply(&self) -> Reply {
        let mut reply = Reply::new();
        if let Some(position) = self.reported("Filter") {
            reply.insert("Filter", position);
        }
        for (i, name) in self.filter_names.iter().enumerate() {
            reply.insert(format!("Filter{}", i + 1), name.clone());
        }
        reply
    }

    fn current_sample(&self) -> ScriptedStatus {
        self.current_status.unwrap_or_else(|| {
            // Without a script the cooler holds the setpoint
            let setpoint = self
                .setup
                .get("CCDTemperatureSetpoint")
                .and_then(|v| v.parse().ok())
                .unwrap_or(15.0);
            ScriptedStatus::new(setpoint, IDLE_COOLER_POWER)
        })
    }

    fn status_reply(&mut self, params: &[(String, String)]) -> Reply {
        let all = ["CCDTemperature", "CoolerPower", "CCDState", "FilterState"];
        let names: Vec<&str> = if params.is_empty() {
            all.to_vec()
        } else {
            params.iter().map(|(n, _)| n.as_str()).collect()
        };

        // Each read that reports the temperature consumes one scripted sample
        if names.contains(&"CCDTemperature") {
            if let Some(next) = self.status_script.pop_front() {
                self.current_status = Some(next);
            }
        }
        let sample = self.current_sample();

        let mut reply = Reply::new();
        for name in names {
            match name {
                "CCDTemperature" => reply.insert(name, format!("{:.3}", sample.temperature_c)),
                "CoolerPower" => reply.insert(name, format!("{:.1}", sample.cooler_power_pct)),
                "CCDState" => {
                    let state = if self.exposing_remaining > 0 {
                        self.exposing_remaining -= 1;
                        "2"
                    } else {
                        "0"
                    };
                    reply.insert(name, state);
                }
                "FilterState" => {
                    let settle = self.filter_settle;
                    let state = match settle {
                        FilterSettle::Never => "1",
                        FilterSettle::Delayed { start, travel } => {
                            let elapsed = self.filter_move.map(|(written, _)| written.elapsed());
                            match elapsed {
                                Some(t) if t >= start && t < start + travel => "1",
                                _ => "0",
                            }
                        }
                        _ if self.settle_remaining > 0 => {
                            self.settle_remaining -= 1;
                            "1"
                        }
                        _ => "0",
                    };
                    reply.insert(name, state);
                }
                _ => {}
            }
        }
        reply
    }
}

/// Mock transport adapter for testing
pub struct MockTransportAdapter {
    state: Mutex<MockState>,
    connected: AtomicBool,
}

impl Default for MockTransportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransportAdapter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                setup: MockState::power_on_setup(),
                readback: HashMap::new(),
                filter_position: 1,
                filter_names: DEFAULT_FILTER_NAMES.iter().map(|s| s.to_string()).collect(),
                filter_settle: FilterSettle::Immediate,
                settle_remaining: 0,
                filter_move: None,
                status_script: VecDeque::new(),
                current_status: None,
                exposing_polls: 0,
                exposing_remaining: 0,
                exposures: Vec::new(),
                image: Bytes::from_static(b"SIMPLE  =                    T"),
                reboots: 0,
                requests: Vec::new(),
            }),
            connected: AtomicBool::new(true),
        }
    }

    /// Force the camera to report `value` for `name` regardless of writes
    pub fn set_readback(&self, name: &str, value: &str) {
        self.state
            .lock()
            .readback
            .insert(name.to_string(), value.to_string());
    }

    pub fn clear_readback(&self, name: &str) {
        self.state.lock().readback.remove(name);
    }

    /// Queue status samples; the last one keeps being reported
    pub fn push_status(&self, samples: impl IntoIterator<Item = ScriptedStatus>) {
        self.state.lock().status_script.extend(samples);
    }

    pub fn set_filter_settle(&self, settle: FilterSettle) {
        self.state.lock().filter_settle = settle;
    }

    /// Number of CCD state polls that report "exposing" after a start
    pub fn set_exposing_polls(&self, polls: u32) {
        self.state.lock().exposing_polls = polls;
    }

    pub fn set_image(&self, data: impl Into<Bytes>) {
        self.state.lock().image = data.into();
    }

    /// Set connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Value the camera currently holds (ignores read-back overrides)
    pub fn setup_value(&self, name: &str) -> Option<String> {
        self.state.lock().setup.get(name).cloned()
    }

    pub fn filter_position(&self) -> i64 {
        self.state.lock().filter_position
    }

    pub fn reboots(&self) -> u32 {
        self.state.lock().reboots
    }

    /// Parameters of every exposure started so far
    pub fn exposures(&self) -> Vec<Params> {
        self.state.lock().exposures.clone()
    }

    pub fn requests(&self) -> Vec<(Endpoint, Params)> {
        self.state.lock().requests.clone()
    }

    pub fn request_count(&self, endpoint: Endpoint) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .count()
    }

    fn check_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::ConnectionFailed(
                "mock camera unreachable".to_string(),
            ))
        }
    }
}

#[async_trait]
impl TransportAdapter for MockTransportAdapter {
    async fn request(
        &self,
        endpoint: Endpoint,
        params: &[(String, String)],
    ) -> Result<Reply, TransportError> {
        self.check_connected()?;

        let mut state = self.state.lock();
        state.requests.push((endpoint, params.to_vec()));

        match endpoint {
            Endpoint::DeviceInfo => Ok(Reply::new()
                .with("Camera Model", "STXL-6303E")
                .with("Firmware Version", "1.25")
                .with("Serial Number", "SIM0001")),
            Endpoint::SetupRead => Ok(state.setup_reply(params)),
            Endpoint::SetupWrite => {
                for (name, value) in params {
                    state.setup.insert(name.clone(), value.clone());
                }
                Ok(state.setup_reply(&[]))
            }
            Endpoint::Status => Ok(state.status_reply(params)),
            Endpoint::ExposureStart => {
                state.exposures.push(params.to_vec());
                state.exposing_remaining = state.exposing_polls;
                Ok(params.iter().cloned().collect())
            }
            Endpoint::ExposureAbort => {
                state.exposing_remaining = 0;
                Ok(Reply::new())
            }
            Endpoint::FilterRead => Ok(state.filter_reply()),
            Endpoint::FilterWrite => {
                let position = params
                    .iter()
                    .find(|(name, _)| name == "Filter")
                    .and_then(|(_, v)| v.parse::<i64>().ok())
                    .ok_or_else(|| {
                        TransportError::RequestFailed("filter write without position".into())
                    })?;
                state.filter_move = Some((Instant::now(), state.wheel_position()));
                state.filter_position = position;
                state.settle_remaining = match state.filter_settle {
                    FilterSettle::AfterPolls(n) => n,
                    _ => 0,
                };
                Ok(state.filter_reply())
            }
            Endpoint::Reboot => {
                state.reboots += 1;
                state.setup = MockState::power_on_setup();
                state.filter_position = 1;
                state.filter_move = None;
                state.exposing_remaining = 0;
                // The real camera drops the connection instead of answering
                Err(TransportError::Timeout("reboot request".to_string()))
            }
            Endpoint::Image => Err(TransportError::Unsupported(
                "image is a download endpoint".to_string(),
            )),
        }
    }

    async fn download(&self, endpoint: Endpoint) -> Result<Bytes, TransportError> {
        self.check_connected()?;

        let mut state = self.state.lock();
        state.requests.push((endpoint, Vec::new()));
        match endpoint {
            Endpoint::Image => Ok(state.image.clone()),
            other => Err(TransportError::Unsupported(format!(
                "{} is not a download endpoint",
                other
            ))),
        }
    }

    fn address(&self) -> String {
        "mock://stxl".to_string()
    }
}
