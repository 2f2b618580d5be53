// crates/tool-gateway/src/server.rs
// ============================================================================
// Module: Gateway HTTP Server
// Description: axum transport for the tool-call endpoint and health probe.
// Purpose: Bind the listener, run the reload task, and serve until shutdown.
// Dependencies: axum, tokio, tool-gateway-config, tracing
// ============================================================================

//! ## Overview
//! Two routes are served: `POST <gateway_path>` feeds the body and the
//! `Authorization` header into [`Gateway::handle`], and `GET /healthz`
//! answers `{ok: true, updated: <unix millis>}` without touching auth,
//! limits, or routing. Bodies are read up to `server.max_body_bytes`;
//! larger or unreadable bodies are reported by the pipeline as
//! `bad_request` after authentication.
//!
//! In `interval` reload mode a background task refreshes the routing table
//! for the lifetime of the server. Ctrl-C triggers a graceful shutdown.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::body::to_bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::WWW_AUTHENTICATE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tool_gateway_config::GatewayConfig;
use tool_gateway_config::HEALTH_PATH;
use tool_gateway_config::ReloadMode;

use crate::gateway::Gateway;
use crate::gateway::GatewayReply;
use crate::gateway::InboundBody;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reason reported when the transport cannot deliver the body.
const BODY_REJECTED: &str = "request body exceeds limit or could not be read";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway server errors.
#[derive(Debug, Error)]
pub enum GatewayServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Health probe response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always true while the process serves requests.
    pub ok: bool,
    /// Response time in milliseconds since the Unix epoch.
    pub updated: u64,
}

/// Tool gateway HTTP server.
pub struct GatewayServer {
    /// Validated configuration.
    config: GatewayConfig,
    /// Shared request pipeline.
    gateway: Arc<Gateway>,
}

impl GatewayServer {
    /// Validates the configuration and builds the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayServerError`] when configuration is invalid or the
    /// initial routing document cannot be loaded.
    pub async fn from_config(config: GatewayConfig) -> Result<Self, GatewayServerError> {
        config.validate().map_err(|err| GatewayServerError::Config(err.to_string()))?;
        let gateway = Gateway::from_config(&config).await?;
        Ok(Self {
            config,
            gateway: Arc::new(gateway),
        })
    }

    /// Wraps an already assembled gateway.
    #[must_use]
    pub const fn with_gateway(config: GatewayConfig, gateway: Arc<Gateway>) -> Self {
        Self {
            config,
            gateway,
        }
    }

    /// Returns the shared gateway.
    #[must_use]
    pub const fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Builds the axum router for this server.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.gateway), &self.config.server.gateway_path)
    }

    /// Binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), GatewayServerError> {
        let addr = self
            .config
            .server
            .bind_addr()
            .map_err(|err| GatewayServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| GatewayServerError::Transport(format!("bind {addr} failed: {err}")))?;
        self.serve_with_listener(listener, shutdown_signal()).await
    }

    /// Serves on an existing listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayServerError::Transport`] when the server fails.
    pub async fn serve_with_listener<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), GatewayServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let reloader = (self.gateway.reload_mode() == ReloadMode::Interval)
            .then(|| self.gateway.routes().spawn_reloader(self.config.routing.reload_interval()));
        if let Ok(local) = listener.local_addr() {
            tracing::info!(
                addr = %local,
                path = %self.config.server.gateway_path,
                routes = %self.gateway.routes().source_description(),
                "tool gateway listening"
            );
        }
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| GatewayServerError::Transport(format!("http server failed: {err}")));
        if let Some(handle) = reloader {
            handle.abort();
        }
        result
    }
}

/// Builds the router serving the tool-call endpoint and the health probe.
pub fn build_router(gateway: Arc<Gateway>, gateway_path: &str) -> Router {
    Router::new()
        .route(gateway_path, post(handle_tool_call))
        .route(HEALTH_PATH, get(handle_health))
        .with_state(gateway)
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `POST <gateway_path>`.
async fn handle_tool_call(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let auth_header = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    let reply = match to_bytes(body, gateway.max_body_bytes()).await {
        Ok(bytes) => gateway.handle(auth_header, InboundBody::Complete(&bytes)).await,
        Err(_) => gateway.handle(auth_header, InboundBody::Rejected(BODY_REJECTED)).await,
    };
    reply_response(reply)
}

/// Handles `GET /healthz`.
async fn handle_health() -> Json<HealthResponse> {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    Json(HealthResponse {
        ok: true,
        updated: u64::try_from(millis).unwrap_or(u64::MAX),
    })
}

/// Renders a pipeline reply as an HTTP response.
fn reply_response(reply: GatewayReply) -> Response {
    let status = reply.status;
    let mut response = (status, Json(reply.envelope)).into_response();
    if status == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "ctrl-c handler unavailable; serving until terminated");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

// ============================================================================
// SECTION: Tests
// ============================================================================
