// crates/tool-gateway/src/upstream.rs
// ============================================================================
// Module: Upstream Forwarder
// Description: Single-attempt, deadline-bounded tool calls to upstreams.
// Purpose: Forward `{tool, input}` and normalize every failure to an envelope.
// Dependencies: reqwest, serde, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! [`UpstreamForwarder::forward`] posts `{tool, input}` to the resolved base
//! URL with the gateway's upstream bearer secret. The whole exchange,
//! including the body read, runs under one deadline; when it expires the
//! in-flight request is dropped and the call reports `upstream_timeout`.
//! Non-2xx statuses map to `upstream_<status>` with the upstream's embedded
//! error message when it has one. Calls are never retried.
//!
//! Security posture: upstream bodies are untrusted and size-limited before
//! parsing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error as _;
use std::time::Duration;

use reqwest::Client;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tool_gateway_config::GatewayConfig;
use tool_gateway_config::SecretString;

use crate::envelope::ToolErrorBody;
use crate::envelope::ToolResponseEnvelope;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Upstream call failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// The deadline expired before the exchange completed.
    #[error("Upstream request timed out")]
    Timeout,
    /// Transport-level failure such as a refused connection.
    #[error("{0}")]
    Failure(String),
    /// Upstream answered with a non-success status.
    #[error("{message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Embedded upstream message or the status text.
        message: String,
    },
    /// Successful status with a body that is not JSON.
    #[error("upstream returned invalid JSON")]
    InvalidPayload,
}

impl UpstreamError {
    /// Returns the stable error code for the failure.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Timeout => "upstream_timeout".to_string(),
            Self::Failure(_) => "upstream_failure".to_string(),
            Self::Status {
                status, ..
            } => format!("upstream_{status}"),
            Self::InvalidPayload => "invalid_json".to_string(),
        }
    }

    /// Converts the failure into an error body.
    #[must_use]
    pub fn to_body(&self) -> ToolErrorBody {
        ToolErrorBody::new(self.code(), self.to_string())
    }
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Forwarder settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Bearer secret presented to upstreams.
    pub api_key: SecretString,
    /// Deadline for the whole exchange.
    pub timeout: Duration,
    /// Deadline for establishing the connection.
    pub connect_timeout: Duration,
    /// Maximum accepted response body size.
    pub max_response_bytes: usize,
}

impl UpstreamSettings {
    /// Extracts forwarder settings from the gateway configuration.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            api_key: config.upstream_api_key().clone(),
            timeout: config.upstream.timeout(),
            connect_timeout: config.upstream.connect_timeout(),
            max_response_bytes: config.upstream.max_response_bytes,
        }
    }
}

/// Request body posted upstream.
#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    /// Tool name.
    tool: &'a str,
    /// Tool input, omitted when the caller sent none.
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<&'a Value>,
}

/// HTTP forwarder for tool calls.
#[derive(Debug, Clone)]
pub struct UpstreamForwarder {
    /// Shared connection pool.
    client: Client,
    /// Forwarder settings.
    settings: UpstreamSettings,
}

impl UpstreamForwarder {
    /// Builds a forwarder.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Failure`] when the HTTP client cannot be
    /// constructed.
    pub fn new(settings: UpstreamSettings) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| UpstreamError::Failure(format!("http client build failed: {err}")))?;
        Ok(Self {
            client,
            settings,
        })
    }

    /// Returns the configured deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    /// Forwards a tool call and returns the normalized response envelope.
    ///
    /// Never fails: every error is reported as a failure envelope.
    pub async fn forward(
        &self,
        address: &str,
        tool: &str,
        input: Option<&Value>,
    ) -> ToolResponseEnvelope {
        match self.call(address, tool, input).await {
            Ok(body) => ToolResponseEnvelope::from_upstream(body),
            Err(err) => ToolResponseEnvelope::Failure {
                error: err.to_body(),
            },
        }
    }

    /// Performs one call and returns the parsed success body.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on timeout, transport failure, non-success
    /// status, or a body that is not JSON.
    pub async fn call(
        &self,
        address: &str,
        tool: &str,
        input: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        let request = self
            .client
            .post(address)
            .bearer_auth(self.settings.api_key.expose())
            .json(&UpstreamRequest {
                tool,
                input,
            });
        tokio::time::timeout(self.settings.timeout, self.exchange(request))
            .await
            .unwrap_or(Err(UpstreamError::Timeout))
    }

    /// Sends the request and interprets the response.
    async fn exchange(&self, request: RequestBuilder) -> Result<Value, UpstreamError> {
        let response = request.send().await.map_err(|err| map_send_error(&err))?;
        let status = response.status();
        let body = read_body(response, self.settings.max_response_bytes).await;
        if !status.is_success() {
            // An unreadable or oversized error body still reports the status.
            let message = body
                .ok()
                .as_deref()
                .and_then(embedded_error_message)
                .unwrap_or_else(|| status_text(status));
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_slice(&body?).map_err(|_| UpstreamError::InvalidPayload)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a response body, enforcing `max_bytes`.
async fn read_body(mut response: Response, max_bytes: usize) -> Result<Vec<u8>, UpstreamError> {
    let max_bytes_u64 = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if response.content_length().is_some_and(|length| length > max_bytes_u64) {
        return Err(UpstreamError::Failure("upstream response too large".to_string()));
    }
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|err| map_send_error(&err))? {
        if body.len().saturating_add(chunk.len()) > max_bytes {
            return Err(UpstreamError::Failure("upstream response too large".to_string()));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Maps a reqwest error to a timeout or a transport failure.
fn map_send_error(error: &reqwest::Error) -> UpstreamError {
    if error.is_timeout() {
        return UpstreamError::Timeout;
    }
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    UpstreamError::Failure(message)
}

/// Extracts `error.message` from an upstream error body.
fn embedded_error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("error")?.get("message")?.as_str().map(ToString::to_string)
}

/// Canonical reason phrase for a status, or its number.
fn status_text(status: StatusCode) -> String {
    status.canonical_reason().map_or_else(|| status.as_u16().to_string(), ToString::to_string)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_failure_class() {
        assert_eq!(UpstreamError::Timeout.code(), "upstream_timeout");
        assert_eq!(UpstreamError::Failure("x".to_string()).code(), "upstream_failure");
        let status = UpstreamError::Status {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(status.code(), "upstream_503");
        assert_eq!(status.to_body().message, "Service Unavailable");
        assert_eq!(UpstreamError::InvalidPayload.code(), "invalid_json");
        assert_eq!(UpstreamError::Timeout.to_body().message, "Upstream request timed out");
    }

    #[test]
    fn embedded_message_requires_error_object() {
        assert_eq!(embedded_error_message(br#"{"error":{"message":"boom"}}"#), Some("boom".into()));
        assert_eq!(embedded_error_message(br#"{"error":"boom"}"#), None);
        assert_eq!(embedded_error_message(b"<html>"), None);
    }

    #[test]
    fn status_text_falls_back_to_number() {
        assert_eq!(status_text(StatusCode::BAD_GATEWAY), "Bad Gateway");
        let custom = StatusCode::from_u16(599).unwrap_or(StatusCode::BAD_GATEWAY);
        assert_eq!(status_text(custom), "599");
    }

    #[test]
    fn upstream_request_omits_missing_input() {
        let body = serde_json::to_string(&UpstreamRequest {
            tool: "a.b",
            input: None,
        })
        .unwrap_or_default();
        assert_eq!(body, r#"{"tool":"a.b"}"#);
    }
}
