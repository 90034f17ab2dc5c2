//! HTTP transport for the camera's embedded web server
//!
//! Settings live in HTML forms that are written by resubmitting the whole
//! form as a GET query. The last copy of each form is cached so a write only
//! changes the requested fields. Status values come from small `/api/*.cgi`
//! endpoints, one value per call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::{Client, Response};
use stxl_core::config::ConnectionConfig;
use stxl_core::transport::{Endpoint, Reply, TransportAdapter, TransportError};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::Result;
use crate::form::{self, encode_query, Form};

const INDEX_PATH: &str = "/index.html";
const IMAGE_PATH: &str = "/Image.FIT";
const ABORT_PATH: &str = "/exposure.html?Abort";

/// Status fields in the order they are read when none are requested
const STATUS_FIELDS: [&str; 4] = ["CCDTemperature", "CoolerPower", "CCDState", "FilterState"];

/// Camera pages holding a settings form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Page {
    Setup,
    Exposure,
    Filter,
    Network,
}

impl Page {
    fn path(&self) -> &'static str {
        match self {
            Page::Setup => "/setup.html",
            Page::Exposure => "/exposure.html",
            Page::Filter => "/filtersetup.html",
            Page::Network => "/network.html",
        }
    }

    fn form(&self) -> &'static str {
        match self {
            Page::Setup => "CameraSetup",
            Page::Exposure => "Exposure",
            Page::Filter => "FilterNames",
            Page::Network => "EthernetParams",
        }
    }
}

/// Status API method reporting `field`
fn api_method(field: &str) -> std::result::Result<&'static str, TransportError> {
    match field {
        "CCDTemperature" => Ok("ImagerGetSettings.cgi?CCDTemperature"),
        "CoolerPower" => Ok("ImagerGetSettings.cgi?CoolerPower"),
        "CCDState" => Ok("CurrentCCDState.cgi"),
        "FilterState" => Ok("FilterState.cgi"),
        other => Err(TransportError::Unsupported(format!(
            "no status API for {}",
            other
        ))),
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '&']).next().unwrap_or(path)
}

fn map_error(path: &str, e: reqwest::Error) -> TransportError {
    let path = strip_query(path);
    if e.is_timeout() {
        TransportError::Timeout(format!("{}: {}", path, e))
    } else if e.is_connect() {
        TransportError::ConnectionFailed(format!("{}: {}", path, e))
    } else if let Some(status) = e.status() {
        TransportError::Http {
            path: path.to_string(),
            status: status.as_u16(),
        }
    } else if e.is_decode() || e.is_body() {
        TransportError::MalformedResponse(format!("{}: {}", path, e))
    } else {
        TransportError::RequestFailed(format!("{}: {}", path, e))
    }
}

/// Transport talking to the camera over HTTP
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    reboot_timeout: Duration,
    forms: Mutex<HashMap<Page, Form>>,
    nonce: AtomicU64,
}

impl HttpTransport {
    /// Create a transport with default timeouts
    ///
    /// # Arguments
    /// * `base_url` - Camera address (e.g., "http://10.0.1.3")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::from_config(&ConnectionConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    /// Create a transport from the `connection` configuration section
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_ms))
            .connect_timeout(Duration::from_millis(config.connect_ms))
            .build()?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))?;

        Ok(Self {
            client,
            base_url,
            reboot_timeout: Duration::from_millis(config.reboot_request_ms),
            forms: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get(&self, path: &str, timeout: Option<Duration>) -> std::result::Result<Response, TransportError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| TransportError::InvalidConfig(format!("{}: {}", path, e)))?;
        debug!(%url, "GET");

        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(|e| map_error(path, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http {
                path: strip_query(path).to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_text(&self, path: &str, timeout: Option<Duration>) -> std::result::Result<String, TransportError> {
        self.get(path, timeout)
            .await?
            .text()
            .await
            .map_err(|e| map_error(path, e))
    }

    /// Fetch a page (optionally with a query) and cache its form
    async fn load_form(
        &self,
        page: Page,
        query: Option<&str>,
        timeout: Option<Duration>,
    ) -> std::result::Result<Form, TransportError> {
        let path = match query {
            Some(query) => format!("{}?{}", page.path(), query),
            None => page.path().to_string(),
        };
        let html = self.get_text(&path, timeout).await?;
        let form = form::parse_form(&html, page.form())?;
        self.forms.lock().insert(page, form.clone());
        Ok(form)
    }

    async fn cached_form(&self, page: Page) -> std::result::Result<Form, TransportError> {
        let cached = self.forms.lock().get(&page).cloned();
        match cached {
            Some(form) => Ok(form),
            None => self.load_form(page, None, None).await,
        }
    }

    /// Resubmit the complete form with `params` changed
    async fn submit(
        &self,
        page: Page,
        params: &[(String, String)],
    ) -> std::result::Result<Form, TransportError> {
        let merged = self.cached_form(page).await?.merge(params)?;
        self.load_form(page, Some(&encode_query(&merged)), None)
            .await
    }

    async fn call_api(&self, field: &str) -> std::result::Result<String, TransportError> {
        // Cache-busting suffix, as the camera's own UI does
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let path = format!("/api/{}&{}", api_method(field)?, nonce);
        Ok(self.get_text(&path, None).await?.trim().to_string())
    }

    async fn read_status(
        &self,
        params: &[(String, String)],
    ) -> std::result::Result<Reply, TransportError> {
        let fields: Vec<&str> = if params.is_empty() {
            STATUS_FIELDS.to_vec()
        } else {
            params.iter().map(|(name, _)| name.as_str()).collect()
        };

        let mut reply = Reply::new();
        for field in fields {
            reply.insert(field, self.call_api(field).await?);
        }
        Ok(reply)
    }

    /// Resubmit the unchanged network form; the camera reboots instead of
    /// answering, so this normally ends in a timeout.
    async fn reboot(&self) -> std::result::Result<Reply, TransportError> {
        let network = self.cached_form(Page::Network).await?;
        let query = encode_query(network.fields());
        let result = self
            .load_form(Page::Network, Some(&query), Some(self.reboot_timeout))
            .await;

        // Cached forms describe the camera before the reboot
        self.forms.lock().clear();
        if let Err(e) = &result {
            debug!(error = %e, "Reboot request ended without reply");
        }
        result.map(|form| form.to_reply())
    }
}

#[async_trait]
impl TransportAdapter for HttpTransport {
    #[instrument(skip(self, params), fields(base_url = %self.base_url))]
    async fn request(
        &self,
        endpoint: Endpoint,
        params: &[(String, String)],
    ) -> std::result::Result<Reply, TransportError> {
        match endpoint {
            Endpoint::DeviceInfo => {
                let html = self.get_text(INDEX_PATH, None).await?;
                let info = form::parse_properties(&html);
                if info.is_empty() {
                    warn!("Index page has no device properties");
                }
                Ok(info)
            }
            Endpoint::SetupRead => Ok(self.load_form(Page::Setup, None, None).await?.to_reply()),
            Endpoint::SetupWrite => Ok(self.submit(Page::Setup, params).await?.to_reply()),
            Endpoint::Status => self.read_status(params).await,
            Endpoint::ExposureStart => Ok(self.submit(Page::Exposure, params).await?.to_reply()),
            Endpoint::ExposureAbort => {
                self.get_text(ABORT_PATH, None).await?;
                Ok(Reply::new())
            }
            Endpoint::FilterRead => Ok(self.load_form(Page::Filter, None, None).await?.to_reply()),
            Endpoint::FilterWrite => {
                let query = encode_query(params);
                Ok(self
                    .load_form(Page::Filter, Some(&query), None)
                    .await?
                    .to_reply())
            }
            Endpoint::Reboot => self.reboot().await,
            Endpoint::Image => Err(TransportError::Unsupported(
                "image is a download endpoint".to_string(),
            )),
        }
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn download(&self, endpoint: Endpoint) -> std::result::Result<Bytes, TransportError> {
        match endpoint {
            Endpoint::Image => self
                .get(IMAGE_PATH, None)
                .await?
                .bytes()
                .await
                .map_err(|e| map_error(IMAGE_PATH, e)),
            other => Err(TransportError::Unsupported(format!(
                "{} is not a download endpoint",
                other
            ))),
        }
    }

    fn address(&self) -> String {
        self.base_url.to_string()
    }
}
