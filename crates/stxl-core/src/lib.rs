//! stxl-core - Driver core for STXL CCD cameras
//!
//! This crate holds everything above the wire: the typed settings schema, the
//! configuration register, the write-verify protocol, the exposure state
//! machine with latchup detection and recovery, and the filter wheel controller.
//! The network side is abstracted behind [`TransportAdapter`]; the HTTP
//! implementation lives in `stxl-client`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CameraSession                          │
//! │  initialize / take_exposure / set_filter                    │
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │ Exposure     │  │ Latchup      │  │ FilterWheel      │   │
//! │  │ (state mach.)│  │ (recovery)   │  │ (settle/verify)  │   │
//! │  └──────┬───────┘  └──────────────┘  └────────┬─────────┘   │
//! │         │          ┌──────────────┐           │             │
//! │         └─────────▶│ WriteVerify  │◀──────────┘             │
//! │                    └──────┬───────┘                         │
//! │                    ┌──────┴───────┐                         │
//! │                    │ Register     │                         │
//! │                    └──────┬───────┘                         │
//! │                 ┌─────────┴────────┐                        │
//! │                 │ TransportAdapter │                        │
//! │                 │ (HTTP / mock)    │                        │
//! │                 └──────────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod exposure;
pub mod filter;
pub mod latchup;
pub mod poll;
pub mod protocol;
pub mod register;
pub mod schema;
pub mod session;
pub mod status;
pub mod store;
pub mod transport;
pub mod value;

pub use config::{CameraConfig, ConfigError};
pub use error::{CameraError, Mismatch, Result};
pub use events::{CameraEvent, EventSink, FanoutSink, RecordingSink, Severity, TracingSink};
pub use exposure::{
    ExposureRequest, ExposureResult, ExposureState, Frame, Telemetry, TelemetrySample,
};
pub use filter::FilterWheel;
pub use latchup::{LatchupDetector, LatchupEvent, Reinitialize, RecoveryOutcome, RecoveryStrategy};
pub use poll::{poll_until, PollSpec};
pub use protocol::WriteVerify;
pub use register::ConfigurationRegister;
pub use schema::{SettingGroup, SettingKey, SettingSpec, ValueKind, WritePolicy};
pub use session::CameraSession;
pub use status::{CcdState, FilterWheelState, StatusField, StatusSnapshot};
pub use store::{FileImageStore, ImageStore, MemoryImageStore};
pub use transport::{Endpoint, Reply, TransportAdapter, TransportError};
pub use value::SettingValue;
