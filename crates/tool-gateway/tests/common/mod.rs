// crates/tool-gateway/tests/common/mod.rs
// ============================================================================
// Module: Gateway Test Helpers
// Description: In-process upstream stubs and gateway fixtures.
// Purpose: Drive the gateway over real HTTP against scripted upstreams.
// Dependencies: axum, reqwest, tempfile, tokio, tool-gateway
// ============================================================================

//! ## Overview
//! [`UpstreamStub`] is an axum server bound to `127.0.0.1:0` that answers
//! every POST with a scripted status, body, and delay, and records what it
//! received. [`GatewayHandle`] runs a full gateway server on an ephemeral
//! port with a routing document written to a temp file.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Shared test helpers; not every test binary uses every helper."
)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tool_gateway::GatewayServer;
use tool_gateway_config::GatewayConfig;
use tool_gateway_config::SecretString;

// ============================================================================
// SECTION: Upstream Stub
// ============================================================================

/// Shared secret used by gateway fixtures.
pub const API_KEY: &str = "test-gateway-key";

/// Scripted upstream reply.
#[derive(Debug, Clone)]
pub struct StubReply {
    /// HTTP status.
    pub status: u16,
    /// Raw response body.
    pub body: String,
    /// Delay before answering.
    pub delay: Duration,
}

impl StubReply {
    /// 200 with a JSON body.
    pub fn json(value: &Value) -> Self {
        Self::raw(200, value.to_string())
    }

    /// Arbitrary status and body.
    pub fn raw(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    /// Delays the reply.
    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Request observed by a stub.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Authorization header value.
    pub authorization: Option<String>,
    /// Parsed JSON body.
    pub body: Value,
}

#[derive(Clone)]
struct StubState {
    reply: StubReply,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Running upstream stub; shuts down on drop.
pub struct UpstreamStub {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl UpstreamStub {
    /// Starts a stub answering every POST with `reply`.
    pub async fn spawn(reply: StubReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("stub bind");
        let addr = listener.local_addr().expect("stub addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            reply,
            requests: Arc::clone(&requests),
        };
        let app = Router::new().route("/", post(handle_stub)).with_state(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });
        Self {
            base_url: format!("http://{addr}/"),
            requests,
            shutdown: Some(shutdown_tx),
        }
    }

    /// Returns the stub URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns captured requests.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for UpstreamStub {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn handle_stub(
    State(state): State<StubState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.requests.lock().unwrap().push(RecordedRequest {
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });
    if !state.reply.delay.is_zero() {
        tokio::time::sleep(state.reply.delay).await;
    }
    let status = StatusCode::from_u16(state.reply.status).unwrap();
    (status, [(CONTENT_TYPE, "application/json")], state.reply.body.clone()).into_response()
}

/// Returns an address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}

// ============================================================================
// SECTION: Gateway Fixture
// ============================================================================

/// Routing document pointing catalog, policy, and one provider at `url`s.
pub fn routes_yaml(catalog: &str, policy: &str, providers: &[(&str, &str, &str)]) -> String {
    let mut doc = format!(
        "catalog:\n  base_url: '{catalog}'\npolicy:\n  base_url: '{policy}'\nproviders:\n"
    );
    for (provider, server, url) in providers {
        doc.push_str(&format!(
            "  {provider}:\n    servers:\n      {server}:\n        base_url: '{url}'\n"
        ));
    }
    doc
}

/// Gateway configuration wired to a routing file, with audit disabled.
pub fn gateway_config(routes_path: PathBuf) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.api_key = SecretString::new(API_KEY);
    config.routing.path = routes_path;
    config.audit.enabled = false;
    config.upstream.timeout_ms = 2_000;
    config.upstream.connect_timeout_ms = 1_000;
    config
}

/// Running gateway server; shuts down on drop.
pub struct GatewayHandle {
    /// Gateway base URL, e.g. `http://127.0.0.1:1234`.
    pub base_url: String,
    /// Routing document path.
    pub routes_path: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    _dir: TempDir,
}

impl GatewayHandle {
    /// Starts a gateway serving `routes` with `configure` applied to the config.
    pub async fn start(routes: &str, configure: impl FnOnce(&mut GatewayConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let routes_path = dir.path().join("providers.yml");
        std::fs::write(&routes_path, routes).unwrap();
        let mut config = gateway_config(routes_path.clone());
        configure(&mut config);
        let server = GatewayServer::from_config(config).await.expect("gateway init");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(server.serve_with_listener(listener, async {
            let _ = shutdown_rx.await;
        }));
        Self {
            base_url: format!("http://{addr}"),
            routes_path,
            shutdown: Some(shutdown_tx),
            _dir: dir,
        }
    }

    /// Returns the tool-call endpoint URL.
    pub fn endpoint(&self) -> String {
        format!("{}/mcp", self.base_url)
    }

    /// Posts a tool call with the fixture bearer token.
    pub async fn call(&self, body: &Value) -> (u16, Value) {
        self.call_with_auth(body, Some(&format!("Bearer {API_KEY}"))).await
    }

    /// Posts a tool call with an explicit Authorization header.
    pub async fn call_with_auth(&self, body: &Value, auth: Option<&str>) -> (u16, Value) {
        let mut request = reqwest::Client::new().post(self.endpoint()).json(body);
        if let Some(auth) = auth {
            request = request.header(AUTHORIZATION.as_str(), auth);
        }
        let response = request.send().await.expect("gateway request");
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.expect("gateway json body");
        (status, body)
    }
}

impl Drop for GatewayHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
