// crates/tool-gateway/src/gateway.rs
// ============================================================================
// Module: Gateway Pipeline
// Description: Per-call orchestration of auth, admission, routing, and forward.
// Purpose: Turn one inbound tool call into exactly one response envelope.
// Dependencies: axum, futures-util, tokio, tool-gateway-config, tracing
// ============================================================================

//! ## Overview
//! Each call runs the same state machine and stops at the first failing
//! step:
//!
//! 1. authenticate (401 `unauthorized`)
//! 2. refresh the routing table when reloading per request (failures warn)
//! 3. validate the envelope (400 `missing_tool` / `bad_request`)
//! 4. classify and pick the class ceiling
//! 5. admit through the rate limiter (429 `rate_limited`)
//! 6. resolve the target (400 `unknown_provider_or_server`)
//! 7. forward upstream (400 with the upstream error, or 200 with content)
//!
//! Panics inside the pipeline are caught at the boundary and answered as
//! 400 `bad_request`. State (limiter buckets and the routing snapshot) is
//! owned by the [`Gateway`] instance rather than process globals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::http::StatusCode;
use futures_util::FutureExt;
use thiserror::Error;
use tool_gateway_config::AuditConfig;
use tool_gateway_config::GatewayConfig;
use tool_gateway_config::ReloadMode;

use crate::audit::GatewayAuditEvent;
use crate::audit::GatewayAuditEventParams;
use crate::audit::GatewayAuditSink;
use crate::audit::GatewayFileAuditSink;
use crate::audit::GatewayNoopAuditSink;
use crate::audit::GatewayStderrAuditSink;
use crate::auth::AuthError;
use crate::auth::CallerAuthenticator;
use crate::classify::ClassLimits;
use crate::classify::ToolClass;
use crate::classify::classify;
use crate::envelope::EnvelopeError;
use crate::envelope::FALLBACK_UPSTREAM_CODE;
use crate::envelope::ToolCallEnvelope;
use crate::envelope::ToolResponseEnvelope;
use crate::rate_limit::FixedWindowLimiter;
use crate::routing::FileRoutingSource;
use crate::routing::RoutingStore;
use crate::routing::TargetKind;
use crate::routing::UnknownTarget;
use crate::server::GatewayServerError;
use crate::telemetry::GatewayMetricEvent;
use crate::telemetry::GatewayMetrics;
use crate::telemetry::NoopMetrics;
use crate::telemetry::RequestOutcome;
use crate::upstream::UpstreamForwarder;
use crate::upstream::UpstreamSettings;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pipeline failures; each maps to an HTTP status and a stable code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Missing or mismatched credential.
    #[error("Unauthorized")]
    Unauthorized(#[source] AuthError),
    /// Envelope carried no tool name.
    #[error("missing_tool")]
    MissingTool,
    /// Malformed request or caught panic.
    #[error("{0}")]
    BadRequest(String),
    /// Admission control rejected the call.
    #[error("Rate limit exceeded")]
    RateLimited,
    /// No route for the provider/server pair.
    #[error(transparent)]
    UnknownTarget(#[from] UnknownTarget),
    /// Upstream returned or produced an error envelope, kept as received.
    #[error("{}", upstream_message(.0))]
    Upstream(ToolResponseEnvelope),
}

impl GatewayError {
    /// Returns the HTTP status for the failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingTool | Self::BadRequest(_) | Self::UnknownTarget(_) | Self::Upstream(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    /// Returns the stable error code for the failure.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::MissingTool => "missing_tool",
            Self::BadRequest(_) => "bad_request",
            Self::RateLimited => "rate_limited",
            Self::UnknownTarget(_) => "unknown_provider_or_server",
            Self::Upstream(envelope) => envelope.error_code().unwrap_or(FALLBACK_UPSTREAM_CODE),
        }
    }

    /// Builds the failure envelope returned to the caller.
    #[must_use]
    pub fn to_envelope(&self) -> ToolResponseEnvelope {
        match self {
            Self::Upstream(envelope) => envelope.clone(),
            other => ToolResponseEnvelope::failure(other.code(), other.to_string()),
        }
    }
}

/// Returns the message of an upstream failure envelope for display.
fn upstream_message(envelope: &ToolResponseEnvelope) -> String {
    envelope.error().map(|error| error.message).unwrap_or_default()
}

impl From<EnvelopeError> for GatewayError {
    fn from(error: EnvelopeError) -> Self {
        match error {
            EnvelopeError::MissingTool => Self::MissingTool,
            other => Self::BadRequest(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request body as delivered by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundBody<'a> {
    /// Fully read body.
    Complete(&'a [u8]),
    /// Body the transport could not read, with the reason.
    Rejected(&'a str),
}

impl InboundBody<'_> {
    /// Returns the body length, zero when rejected.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Complete(bytes) => bytes.len(),
            Self::Rejected(_) => 0,
        }
    }

    /// Returns true when no bytes were delivered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Response decided by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReply {
    /// HTTP status.
    pub status: StatusCode,
    /// Response envelope.
    pub envelope: ToolResponseEnvelope,
}

impl GatewayReply {
    /// Returns the error code for failure replies.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.envelope.error_code()
    }
}

impl From<GatewayError> for GatewayReply {
    fn from(error: GatewayError) -> Self {
        Self {
            status: error.status(),
            envelope: error.to_envelope(),
        }
    }
}

/// Components assembled into a [`Gateway`].
pub struct GatewayParts {
    /// Caller authenticator.
    pub authenticator: CallerAuthenticator,
    /// Routing snapshot store.
    pub routes: Arc<RoutingStore>,
    /// When the routing table is refreshed.
    pub reload: ReloadMode,
    /// Admission control.
    pub limiter: FixedWindowLimiter,
    /// Per-class ceilings.
    pub limits: ClassLimits,
    /// Upstream forwarder.
    pub forwarder: UpstreamForwarder,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
    /// Audit sink.
    pub audit: Arc<dyn GatewayAuditSink>,
    /// Metrics sink.
    pub metrics: Arc<dyn GatewayMetrics>,
}

/// Facts gathered while a call moves through the pipeline.
#[derive(Debug, Default)]
struct CallTrace {
    /// Tool name once the envelope parsed.
    tool: Option<String>,
    /// Tool class once classified.
    class: Option<ToolClass>,
    /// Target kind once resolved.
    target: Option<TargetKind>,
    /// Provider and server slugs for provider targets.
    provider: Option<(String, String)>,
    /// Credential fingerprint once authenticated.
    caller_fingerprint: Option<String>,
}

/// Tool-call gateway.
pub struct Gateway {
    /// Caller authenticator.
    authenticator: CallerAuthenticator,
    /// Routing snapshot store.
    routes: Arc<RoutingStore>,
    /// When the routing table is refreshed.
    reload: ReloadMode,
    /// Admission control.
    limiter: FixedWindowLimiter,
    /// Per-class ceilings.
    limits: ClassLimits,
    /// Upstream forwarder.
    forwarder: UpstreamForwarder,
    /// Maximum accepted request body size.
    max_body_bytes: usize,
    /// Audit sink.
    audit: Arc<dyn GatewayAuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn GatewayMetrics>,
}

impl Gateway {
    /// Assembles a gateway from its parts.
    #[must_use]
    pub fn new(parts: GatewayParts) -> Self {
        Self {
            authenticator: parts.authenticator,
            routes: parts.routes,
            reload: parts.reload,
            limiter: parts.limiter,
            limits: parts.limits,
            forwarder: parts.forwarder,
            max_body_bytes: parts.max_body_bytes,
            audit: parts.audit,
            metrics: parts.metrics,
        }
    }

    /// Builds a gateway from validated configuration.
    ///
    /// The initial routing document must load; a bad document at startup is
    /// fatal.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayServerError`] when the routing document, HTTP client,
    /// or audit sink cannot be initialized.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self, GatewayServerError> {
        let source = Arc::new(FileRoutingSource::new(&config.routing.path));
        let routes = RoutingStore::load(source).await.map_err(|err| {
            GatewayServerError::Config(format!(
                "routing document {}: {err}",
                config.routing.path.display()
            ))
        })?;
        let forwarder = UpstreamForwarder::new(UpstreamSettings::from_config(config))
            .map_err(|err| GatewayServerError::Init(err.to_string()))?;
        Ok(Self::new(GatewayParts {
            authenticator: CallerAuthenticator::new(config.auth.api_key.clone()),
            routes: Arc::new(routes),
            reload: config.routing.reload,
            limiter: FixedWindowLimiter::new(),
            limits: ClassLimits {
                read: config.rate_limit.read_per_minute,
                write: config.rate_limit.write_per_minute,
            },
            forwarder,
            max_body_bytes: config.server.max_body_bytes,
            audit: audit_sink(&config.audit)?,
            metrics: Arc::new(NoopMetrics),
        }))
    }

    /// Returns the routing store.
    #[must_use]
    pub const fn routes(&self) -> &Arc<RoutingStore> {
        &self.routes
    }

    /// Returns the reload mode.
    #[must_use]
    pub const fn reload_mode(&self) -> ReloadMode {
        self.reload
    }

    /// Returns the maximum accepted request body size.
    #[must_use]
    pub const fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Handles one tool call and records its audit and metric events.
    pub async fn handle(&self, auth_header: Option<&str>, body: InboundBody<'_>) -> GatewayReply {
        let started = Instant::now();
        let mut trace = CallTrace::default();
        let outcome = AssertUnwindSafe(self.run(auth_header, body, &mut trace)).catch_unwind().await;
        let reply = match outcome {
            Ok(Ok(envelope)) => GatewayReply {
                status: StatusCode::OK,
                envelope,
            },
            Ok(Err(error)) => GatewayReply::from(error),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(panic = %message, "tool call pipeline panicked");
                GatewayReply::from(GatewayError::BadRequest(message))
            }
        };
        self.observe(&trace, &reply, body.len(), started.elapsed());
        reply
    }

    /// Runs the pipeline steps in order.
    async fn run(
        &self,
        auth_header: Option<&str>,
        body: InboundBody<'_>,
        trace: &mut CallTrace,
    ) -> Result<ToolResponseEnvelope, GatewayError> {
        let credential =
            self.authenticator.authenticate(auth_header).map_err(GatewayError::Unauthorized)?;
        trace.caller_fingerprint = Some(credential.fingerprint());

        if self.reload == ReloadMode::PerRequest {
            self.routes.refresh_or_warn().await;
        }

        let bytes = match body {
            InboundBody::Complete(bytes) if bytes.len() > self.max_body_bytes => {
                return Err(GatewayError::BadRequest("request body too large".to_string()));
            }
            InboundBody::Complete(bytes) => bytes,
            InboundBody::Rejected(reason) => {
                return Err(GatewayError::BadRequest(reason.to_string()));
            }
        };
        let envelope = ToolCallEnvelope::parse(bytes)?;
        trace.tool = Some(envelope.tool.clone());

        let class = classify(&envelope.tool);
        trace.class = Some(class);
        if !self.limiter.admit(credential.as_str(), class, self.limits.limit_for(class)) {
            return Err(GatewayError::RateLimited);
        }

        let target = self.routes.resolve(&envelope.tool, envelope.server.as_deref())?;
        trace.target = Some(target.kind);
        trace.provider = target.provider;

        match self.forwarder.forward(&target.address, &envelope.tool, envelope.input.as_ref()).await
        {
            reply if reply.is_failure() => {
                let error = GatewayError::Upstream(reply);
                tracing::debug!(tool = %envelope.tool, code = %error.code(), "upstream call failed");
                Err(error)
            }
            success => Ok(success),
        }
    }

    /// Emits the audit and metric events for a finished call.
    fn observe(
        &self,
        trace: &CallTrace,
        reply: &GatewayReply,
        request_bytes: usize,
        latency: Duration,
    ) {
        let outcome =
            if reply.status.is_success() { RequestOutcome::Ok } else { RequestOutcome::Error };
        let error_code = reply.error_code().map(ToString::to_string);
        let metric = GatewayMetricEvent {
            class: trace.class,
            target: trace.target,
            outcome,
            status: reply.status.as_u16(),
            error_code: error_code.clone(),
        };
        self.metrics.record_request(&metric);
        self.metrics.record_latency(&metric, latency);
        let (provider, server) = trace.provider.clone().unzip();
        self.audit.record(&GatewayAuditEvent::new(GatewayAuditEventParams {
            tool: trace.tool.clone(),
            class: trace.class,
            target: trace.target,
            provider,
            server,
            outcome,
            status: reply.status.as_u16(),
            error_code,
            caller_fingerprint: trace.caller_fingerprint.clone(),
            request_bytes,
            latency_ms: latency.as_millis(),
        }));
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the configured audit sink.
fn audit_sink(config: &AuditConfig) -> Result<Arc<dyn GatewayAuditSink>, GatewayServerError> {
    if !config.enabled {
        return Ok(Arc::new(GatewayNoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = GatewayFileAuditSink::new(path).map_err(|err| {
                GatewayServerError::Init(format!("audit log {}: {err}", path.display()))
            })?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(GatewayStderrAuditSink)),
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "internal error".to_string()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
