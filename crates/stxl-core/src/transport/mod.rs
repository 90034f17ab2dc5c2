//! Transport layer for camera communication
//!
//! The driver core never sees HTTP. It talks to the camera through
//! [`TransportAdapter`], which sends a request to a logical [`Endpoint`] and
//! returns the reply as untyped `name -> text` fields:
//! - `HttpTransport` in `stxl-client` for the camera's embedded web server
//! - [`mock::MockTransportAdapter`] for testing
//!
//! # Example
//!
//! ```ignore
//! use stxl_core::transport::{Endpoint, TransportAdapter};
//!
//! let reply = transport
//!     .request(Endpoint::Status, &[("CCDTemperature".into(), String::new())])
//!     .await?;
//! let temperature = reply.require("CCDTemperature")?;
//! ```

mod adapter;
pub mod error;
pub mod mock;

pub use adapter::{read_params, Endpoint, Params, Reply, TransportAdapter};
pub use error::TransportError;
