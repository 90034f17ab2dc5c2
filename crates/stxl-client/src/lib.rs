//! stxl-client - HTTP transport for STXL CCD cameras
//!
//! Implements [`stxl_core::TransportAdapter`] on top of the camera's embedded
//! web server using `reqwest`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stxl_client::HttpTransport;
//! use stxl_core::{CameraConfig, CameraSession, ExposureRequest};
//!
//! let config = CameraConfig::from_yaml_file("camera.yaml")?;
//! let transport = Arc::new(HttpTransport::from_config(&config.connection)?);
//! let mut camera = CameraSession::new(transport, config);
//!
//! camera.connect().await?;
//! camera.initialize(true, 1, 15.0).await?;
//! let result = camera
//!     .take_exposure(ExposureRequest::new(0.0, "data/zero_000.fits")?.shutter_closed())
//!     .await?;
//! ```

pub mod error;
pub mod form;
pub mod http;
pub mod testing;

pub use error::{ClientError, Result};
pub use http::HttpTransport;
