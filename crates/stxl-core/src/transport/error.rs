//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request to {path} failed with HTTP {status}")]
    Http { path: String, status: u16 },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Endpoint not supported: {0}")]
    Unsupported(String),
}
