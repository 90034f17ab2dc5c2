//! Error types for setting up the HTTP transport

use thiserror::Error;

/// Result type alias for client construction
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors creating a transport or test server.
///
/// Failures talking to the camera are reported as
/// [`stxl_core::TransportError`] by the transport itself.
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
