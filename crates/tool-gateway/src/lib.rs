// crates/tool-gateway/src/lib.rs
// ============================================================================
// Module: Tool Gateway
// Description: Authenticating, rate-limiting dispatcher for JSON tool calls.
// Purpose: Resolve `{tool, input}` envelopes to upstream services and forward them.
// Dependencies: tool-gateway-config, axum, reqwest, tokio
// ============================================================================

//! ## Overview
//! The tool gateway is a single edge process in front of a fleet of JSON tool
//! services. Each call is authenticated against a bearer secret, classified
//! as a read or a write, admitted by a fixed-window rate limiter keyed by
//! caller and class, resolved to an upstream base URL through a reloadable
//! routing snapshot, and forwarded once with a bounded deadline. Every
//! failure surfaces as a `{error: {code, message}}` envelope.
//!
//! Security posture: callers and upstream payloads are untrusted; secrets are
//! never logged and request bodies are size-limited.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod classify;
pub mod envelope;
pub mod gateway;
pub mod rate_limit;
pub mod routing;
pub mod server;
pub mod telemetry;
pub mod upstream;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::GatewayAuditEvent;
pub use audit::GatewayAuditEventParams;
pub use audit::GatewayAuditSink;
pub use audit::GatewayFileAuditSink;
pub use audit::GatewayNoopAuditSink;
pub use audit::GatewayStderrAuditSink;
pub use auth::AuthError;
pub use auth::CallerAuthenticator;
pub use auth::CallerCredential;
pub use classify::ClassLimits;
pub use classify::ToolClass;
pub use classify::classify;
pub use envelope::EnvelopeError;
pub use envelope::ToolCallEnvelope;
pub use envelope::ToolContent;
pub use envelope::ToolErrorBody;
pub use envelope::ToolResponseEnvelope;
pub use gateway::Gateway;
pub use gateway::GatewayError;
pub use gateway::GatewayParts;
pub use gateway::GatewayReply;
pub use gateway::InboundBody;
pub use rate_limit::Clock;
pub use rate_limit::FixedWindowLimiter;
pub use rate_limit::ManualClock;
pub use rate_limit::RATE_WINDOW;
pub use rate_limit::RateBucket;
pub use rate_limit::SystemClock;
pub use routing::FileRoutingSource;
pub use routing::RefreshOutcome;
pub use routing::ResolvedTarget;
pub use routing::RoutingSource;
pub use routing::RoutingStore;
pub use routing::StaticRoutingSource;
pub use routing::TargetKind;
pub use routing::UnknownTarget;
pub use routing::resolve_target;
pub use server::GatewayServer;
pub use server::HealthResponse;
pub use server::build_router;
pub use server::GatewayServerError;
pub use telemetry::GATEWAY_LATENCY_BUCKETS_MS;
pub use telemetry::GatewayMetricEvent;
pub use telemetry::GatewayMetrics;
pub use telemetry::NoopMetrics;
pub use telemetry::RequestOutcome;
pub use upstream::UpstreamError;
pub use upstream::UpstreamForwarder;
pub use upstream::UpstreamSettings;
