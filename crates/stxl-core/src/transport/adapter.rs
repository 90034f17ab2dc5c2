//! Transport adapter trait and types

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use super::TransportError;

/// Request parameters as ordered `name=value` pairs
pub type Params = Vec<(String, String)>;

/// Logical camera endpoints.
///
/// Paths and parameter encodings are firmware specific and live in the
/// adapter implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Device properties (model, firmware, serial)
    DeviceInfo,
    /// Read the camera setup form
    SetupRead,
    /// Submit new values to the camera setup form
    SetupWrite,
    /// Read status values (temperature, cooler power, CCD and filter state)
    Status,
    /// Submit the exposure form, which starts an exposure
    ExposureStart,
    /// Abort the exposure in progress
    ExposureAbort,
    /// Download the last image
    Image,
    /// Read the filter wheel page
    FilterRead,
    /// Select a filter wheel position
    FilterWrite,
    /// Resubmit the network form to reboot the camera
    Reboot,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Endpoint::DeviceInfo => "device-info",
            Endpoint::SetupRead => "setup-read",
            Endpoint::SetupWrite => "setup-write",
            Endpoint::Status => "status",
            Endpoint::ExposureStart => "exposure-start",
            Endpoint::ExposureAbort => "exposure-abort",
            Endpoint::Image => "image",
            Endpoint::FilterRead => "filter-read",
            Endpoint::FilterWrite => "filter-write",
            Endpoint::Reboot => "reboot",
        };
        f.write_str(s)
    }
}

/// Parsed `name -> text` reply from the camera
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    fields: BTreeMap<String, String>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Get a field that the camera must have sent
    pub fn require(&self, name: &str) -> Result<&str, TransportError> {
        self.get(name).ok_or_else(|| {
            TransportError::MalformedResponse(format!("reply is missing field {:?}", name))
        })
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, String)> for Reply {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Build read parameters naming the requested fields
pub fn read_params<'a>(names: impl IntoIterator<Item = &'a str>) -> Params {
    names
        .into_iter()
        .map(|n| (n.to_string(), String::new()))
        .collect()
}

/// Interface to the camera's control server
///
/// Read endpoints take the requested field names as parameters with empty
/// values; an empty parameter list asks for everything the endpoint reports.
/// Write endpoints take `name=value` pairs and reply with the camera's
/// acknowledgment fields.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Send a request and parse the key/value reply
    async fn request(&self, endpoint: Endpoint, params: &[(String, String)])
        -> Result<Reply, TransportError>;

    /// Download a binary payload (image data)
    async fn download(&self, endpoint: Endpoint) -> Result<Bytes, TransportError>;

    /// Camera address this adapter talks to
    fn address(&self) -> String;
}
