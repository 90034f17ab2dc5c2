//! Test utilities for stxl-client
//!
//! [`SimulatedCamera`] serves the camera's web pages from an in-process
//! [`MockTransportAdapter`], so [`HttpTransport`] can be exercised end to end
//! over real HTTP. [`TestServer`] runs any axum router on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use stxl_core::config::ConnectionConfig;
use stxl_core::transport::mock::MockTransportAdapter;
use stxl_core::transport::{read_params, Endpoint, Params, Reply, TransportAdapter, TransportError};
use tokio::net::TcpListener;
use url::form_urlencoded;

use crate::{HttpTransport, Result};

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve `router` on a free local port
    ///
    /// # Example
    ///
    /// ```ignore
    /// use stxl_client::testing::{SimulatedCamera, TestServer};
    ///
    /// let camera = SimulatedCamera::new();
    /// let server = TestServer::start(camera.router()).await?;
    /// let transport = server.transport()?;
    /// ```
    pub async fn start(router: Router) -> Result<Self> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Connection settings pointing at this server with short timeouts
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            base_url: self.base_url(),
            request_ms: 5_000,
            connect_ms: 2_000,
            reboot_request_ms: 200,
        }
    }

    /// HTTP transport for this server
    pub fn transport(&self) -> Result<HttpTransport> {
        HttpTransport::from_config(&self.connection())
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// How long the simulated camera leaves a reboot request hanging
const REBOOT_HANG: Duration = Duration::from_secs(2);

/// STXL web interface backed by the mock camera model
#[derive(Clone, Default)]
pub struct SimulatedCamera {
    camera: Arc<MockTransportAdapter>,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// The camera model, for scripting status and inspecting requests
    pub fn mock(&self) -> Arc<MockTransportAdapter> {
        self.camera.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/index.html", get(index))
            .route("/setup.html", get(setup))
            .route("/exposure.html", get(exposure))
            .route("/filtersetup.html", get(filter_setup))
            .route("/network.html", get(network))
            .route("/Image.FIT", get(image))
            .route("/api/{method}", get(api))
            .with_state(self.camera.clone())
    }
}

type Camera = Arc<MockTransportAdapter>;

fn query_pairs(query: Option<&str>) -> Params {
    query
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn failure(error: TransportError) -> Response {
    let status = match error {
        TransportError::ConnectionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string()).into_response()
}

/// Renders a reply as the named form; `radios` lists enumerated fields
fn render_form(name: &str, reply: &Reply, radios: &[(&str, &[&str])]) -> String {
    let mut html = format!("<html><body>\n<form name=\"{}\" action=\"#\">\n", name);
    for (field, value) in reply.fields() {
        match radios.iter().find(|(radio, _)| *radio == field.as_str()) {
            Some((_, choices)) => {
                for choice in *choices {
                    let checked = if *choice == value.as_str() { " checked" } else { "" };
                    html.push_str(&format!(
                        "  <input type=\"radio\" name=\"{}\" value=\"{}\"{}>\n",
                        field, choice, checked
                    ));
                }
            }
            None => html.push_str(&format!(
                "  <input type=\"text\" name=\"{}\" value=\"{}\">\n",
                field, value
            )),
        }
    }
    html.push_str("  <input type=\"submit\" value=\"Apply\">\n</form>\n</body></html>\n");
    html
}

async fn index(State(camera): State<Camera>) -> Response {
    match camera.request(Endpoint::DeviceInfo, &[]).await {
        Ok(info) => {
            let rows: String = info
                .fields()
                .iter()
                .map(|(name, value)| {
                    format!(
                        "<tr><td class=\"valuename\">{}</td><td class=\"value\">{}</td></tr>\n",
                        name, value
                    )
                })
                .collect();
            Html(format!("<html><body><table>\n{}</table></body></html>", rows)).into_response()
        }
        Err(e) => failure(e),
    }
}

async fn setup(State(camera): State<Camera>, RawQuery(query): RawQuery) -> Response {
    let params = query_pairs(query.as_deref());
    let endpoint = if params.is_empty() {
        Endpoint::SetupRead
    } else {
        Endpoint::SetupWrite
    };
    match camera.request(endpoint, &params).await {
        Ok(reply) => Html(render_form(
            "CameraSetup",
            &reply,
            &[
                ("Bin", &["1", "2", "3"]),
                ("CoolerState", &["0", "1"]),
                ("Fan", &["1", "2", "3"]),
            ],
        ))
        .into_response(),
        Err(e) => failure(e),
    }
}

async fn exposure(State(camera): State<Camera>, RawQuery(query): RawQuery) -> Response {
    let params = query_pairs(query.as_deref());
    let result = if params.iter().any(|(name, _)| name == "Abort") {
        camera.request(Endpoint::ExposureAbort, &[]).await
    } else if params.is_empty() {
        Ok(Reply::new()
            .with("ExposureTime", "1")
            .with("ImageType", "1")
            .with("Contrast", "0")
            .with("DateTime", ""))
    } else {
        camera.request(Endpoint::ExposureStart, &params).await
    };

    match result {
        Ok(reply) => Html(render_form(
            "Exposure",
            &reply,
            &[("ImageType", &["0", "1", "2", "3"]), ("Contrast", &["0", "1"])],
        ))
        .into_response(),
        Err(e) => failure(e),
    }
}

async fn filter_setup(State(camera): State<Camera>, RawQuery(query): RawQuery) -> Response {
    let params = query_pairs(query.as_deref());
    let endpoint = if params.is_empty() {
        Endpoint::FilterRead
    } else {
        Endpoint::FilterWrite
    };
    match camera.request(endpoint, &params).await {
        Ok(reply) => Html(render_form(
            "FilterNames",
            &reply,
            &[("Filter", &["1", "2", "3", "4", "5", "6", "7", "8"])],
        ))
        .into_response(),
        Err(e) => failure(e),
    }
}

async fn network(State(camera): State<Camera>, RawQuery(query): RawQuery) -> Response {
    if query.is_some() {
        // The real camera reboots without answering
        let _ = camera.request(Endpoint::Reboot, &[]).await;
        tokio::time::sleep(REBOOT_HANG).await;
    }
    let reply = Reply::new()
        .with("IPAddress", "10.0.1.3")
        .with("SubnetMask", "255.255.255.0")
        .with("Gateway", "10.0.1.1")
        .with("UseDHCP", "0");
    Html(render_form("EthernetParams", &reply, &[("UseDHCP", &["0", "1"])])).into_response()
}

async fn image(State(camera): State<Camera>) -> Response {
    match camera.download(Endpoint::Image).await {
        Ok(data) => ([(header::CONTENT_TYPE, "application/fits")], data).into_response(),
        Err(e) => failure(e),
    }
}

/// `/api/ImagerGetSettings.cgi?CCDTemperature&0.42`, `/api/CurrentCCDState.cgi&7`, ...
async fn api(
    State(camera): State<Camera>,
    Path(method): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let method = method.split('&').next().unwrap_or_default();
    let field = match method {
        "ImagerGetSettings.cgi" => query
            .as_deref()
            .and_then(|q| q.split('&').next())
            .unwrap_or_default()
            .to_string(),
        "CurrentCCDState.cgi" => "CCDState".to_string(),
        "FilterState.cgi" => "FilterState".to_string(),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    match camera
        .request(Endpoint::Status, &read_params([field.as_str()]))
        .await
    {
        Ok(reply) => match reply.get(&field) {
            Some(value) => value.to_string().into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        Err(e) => failure(e),
    }
}
