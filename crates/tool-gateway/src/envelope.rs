// crates/tool-gateway/src/envelope.rs
// ============================================================================
// Module: Tool Envelopes
// Description: Request and response shapes shared with callers and upstreams.
// Purpose: Parse inbound tool calls and normalize upstream responses.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Callers send `{tool, input?, server?}`. Callers and upstreams both speak
//! the response envelope: `{content: [...]}` on success or
//! `{error: {code, message}}` on failure. Upstream bodies that do not use the
//! envelope are wrapped as a single JSON content item.
//!
//! Security posture: inbound bodies are untrusted and parsed without
//! panicking; `input` is opaque and never inspected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Field carrying the server hint.
const SERVER_FIELD: &str = "server";
/// Legacy field name for the server hint.
const LEGACY_SERVER_FIELD: &str = "mcp_server";
/// Error code used when an upstream error object carries no code.
pub(crate) const FALLBACK_UPSTREAM_CODE: &str = "upstream_error";

// ============================================================================
// SECTION: Request Envelope
// ============================================================================

/// Tool call request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallEnvelope {
    /// Dot-segmented tool name, e.g. `provider.action`.
    pub tool: String,
    /// Opaque tool input; absent when the caller sent none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Optional server hint for provider-routed tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

/// Envelope parsing failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Body is not valid JSON.
    #[error("invalid json body: {0}")]
    InvalidJson(String),
    /// `tool` is absent, null, or empty.
    #[error("missing tool name")]
    MissingTool,
    /// A field has the wrong type.
    #[error("{0}")]
    InvalidField(String),
}

impl ToolCallEnvelope {
    /// Builds an envelope for `tool` with the given input.
    #[must_use]
    pub fn new(tool: impl Into<String>, input: Value) -> Self {
        Self {
            tool: tool.into(),
            input: Some(input),
            server: None,
        }
    }

    /// Sets the server hint, returning the updated envelope.
    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Parses an inbound request body.
    ///
    /// An empty body or a non-object JSON value carries no tool and is
    /// reported as [`EnvelopeError::MissingTool`].
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when the body is not JSON, the tool name is
    /// missing, or a field has the wrong type.
    pub fn parse(body: &[u8]) -> Result<Self, EnvelopeError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(EnvelopeError::MissingTool);
        }
        let value: Value =
            serde_json::from_slice(body).map_err(|err| EnvelopeError::InvalidJson(err.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(EnvelopeError::MissingTool);
        };
        let tool = match fields.remove("tool") {
            None | Some(Value::Null) => return Err(EnvelopeError::MissingTool),
            Some(Value::String(tool)) if tool.is_empty() => return Err(EnvelopeError::MissingTool),
            Some(Value::String(tool)) => tool,
            Some(_) => {
                return Err(EnvelopeError::InvalidField("tool must be a string".to_string()));
            }
        };
        let server = match take_server_hint(&mut fields, SERVER_FIELD)? {
            Some(server) => Some(server),
            None => take_server_hint(&mut fields, LEGACY_SERVER_FIELD)?,
        };
        Ok(Self {
            tool,
            input: fields.remove("input"),
            server,
        })
    }
}

/// Removes and validates a server hint field; blank hints count as absent.
fn take_server_hint(
    fields: &mut Map<String, Value>,
    field: &str,
) -> Result<Option<String>, EnvelopeError> {
    match fields.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(server)) if server.is_empty() => Ok(None),
        Some(Value::String(server)) => Ok(Some(server)),
        Some(_) => Err(EnvelopeError::InvalidField(format!("{field} must be a string"))),
    }
}

// ============================================================================
// SECTION: Response Envelope
// ============================================================================

/// Error body carried by a failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolErrorBody {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ToolErrorBody {
    /// Builds an error body.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Reads an upstream `error` value as `{code, message}`.
    fn from_upstream(error: &Value) -> Self {
        match error {
            Value::Object(fields) => {
                let code = fields
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or(FALLBACK_UPSTREAM_CODE);
                let message = fields
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| error.to_string(), ToString::to_string);
                Self::new(code, message)
            }
            Value::String(message) => Self::new(FALLBACK_UPSTREAM_CODE, message.clone()),
            other => Self::new(FALLBACK_UPSTREAM_CODE, other.to_string()),
        }
    }
}

/// Single content item of a success envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    /// Structured JSON payload.
    Json {
        /// Payload value.
        json: Value,
    },
}

/// Response envelope exchanged with callers and upstreams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResponseEnvelope {
    /// Failed call.
    Failure {
        /// Error details.
        error: ToolErrorBody,
    },
    /// Successful call.
    Success {
        /// Content items, passed through from the upstream unchanged.
        content: Value,
    },
    /// Upstream error body relayed to the caller exactly as received.
    Relayed(Value),
}

impl ToolResponseEnvelope {
    /// Wraps a raw JSON value as a single content item.
    #[must_use]
    pub fn json(value: Value) -> Self {
        let item = serde_json::json!({ "type": "json", "json": value });
        Self::Success {
            content: Value::Array(vec![item]),
        }
    }

    /// Builds a failure envelope.
    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            error: ToolErrorBody::new(code, message),
        }
    }

    /// Interprets a parsed upstream success body.
    ///
    /// A body with a truthy `error` field is kept verbatim as a relayed
    /// failure. Otherwise a non-null `content` field is passed through and
    /// anything else is wrapped with [`Self::json`].
    #[must_use]
    pub fn from_upstream(body: Value) -> Self {
        if body.get("error").is_some_and(is_truthy) {
            return Self::Relayed(body);
        }
        match body {
            Value::Object(mut fields)
                if fields.get("content").is_some_and(|content| !content.is_null()) =>
            {
                let content = fields.remove("content").unwrap_or(Value::Null);
                Self::Success { content }
            }
            other => Self::json(other),
        }
    }

    /// Returns true for failure and relayed envelopes.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::Success { .. })
    }

    /// Returns the error as `{code, message}`, normalizing relayed bodies.
    #[must_use]
    pub fn error(&self) -> Option<ToolErrorBody> {
        match self {
            Self::Failure { error } => Some(error.clone()),
            Self::Relayed(body) => body.get("error").map(ToolErrorBody::from_upstream),
            Self::Success { .. } => None,
        }
    }

    /// Returns the error code; relayed bodies without a string code report
    /// the generic upstream code.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Failure { error } => Some(&error.code),
            Self::Relayed(body) => Some(
                body.get("error")
                    .and_then(|error| error.get("code"))
                    .and_then(Value::as_str)
                    .unwrap_or(FALLBACK_UPSTREAM_CODE),
            ),
            Self::Success { .. } => None,
        }
    }

    /// Returns the first JSON content payload of a success envelope.
    #[must_use]
    pub fn first_json(&self) -> Option<Value> {
        let Self::Success { content } = self else {
            return None;
        };
        let items: Vec<ToolContent> = serde_json::from_value(content.clone()).ok()?;
        items.into_iter().next().map(|ToolContent::Json { json }| json)
    }
}

/// JSON truthiness: null, false, zero, and empty strings are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
