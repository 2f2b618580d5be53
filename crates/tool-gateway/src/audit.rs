// crates/tool-gateway/src/audit.rs
// ============================================================================
// Module: Gateway Audit Logging
// Description: Structured audit events for tool-call handling.
// Purpose: Emit redacted per-call audit records as JSON lines.
// Dependencies: serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! One [`GatewayAuditEvent`] is recorded per tool call, after the response is
//! decided. Events carry a credential fingerprint rather than the credential
//! and never include tool inputs or upstream payloads. Sinks write JSON lines
//! to stderr or an append-only file, or discard events. Audit failures never
//! fail the call; they are reported as `tracing` warnings instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::classify::ToolClass;
use crate::routing::TargetKind;
use crate::telemetry::RequestOutcome;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Tool-call audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Tool name when the envelope was valid.
    pub tool: Option<String>,
    /// Tool class when classified.
    pub class: Option<ToolClass>,
    /// Resolved target kind.
    pub target: Option<TargetKind>,
    /// Provider slug for provider targets.
    pub provider: Option<String>,
    /// Server slug for provider targets.
    pub server: Option<String>,
    /// Request outcome.
    pub outcome: RequestOutcome,
    /// HTTP status returned to the caller.
    pub status: u16,
    /// Error code when the call failed.
    pub error_code: Option<String>,
    /// SHA-256 prefix of the caller credential when authenticated.
    pub caller_fingerprint: Option<String>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Wall-clock handling time in milliseconds.
    pub latency_ms: u128,
}

/// Inputs required to construct an audit event.
#[derive(Debug, Clone)]
pub struct GatewayAuditEventParams {
    /// Tool name when the envelope was valid.
    pub tool: Option<String>,
    /// Tool class when classified.
    pub class: Option<ToolClass>,
    /// Resolved target kind.
    pub target: Option<TargetKind>,
    /// Provider slug for provider targets.
    pub provider: Option<String>,
    /// Server slug for provider targets.
    pub server: Option<String>,
    /// Request outcome.
    pub outcome: RequestOutcome,
    /// HTTP status returned to the caller.
    pub status: u16,
    /// Error code when the call failed.
    pub error_code: Option<String>,
    /// SHA-256 prefix of the caller credential when authenticated.
    pub caller_fingerprint: Option<String>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Wall-clock handling time in milliseconds.
    pub latency_ms: u128,
}

impl GatewayAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: GatewayAuditEventParams) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "tool_call",
            timestamp_ms,
            tool: params.tool,
            class: params.class,
            target: params.target,
            provider: params.provider,
            server: params.server,
            outcome: params.outcome,
            status: params.status,
            error_code: params.error_code,
            caller_fingerprint: params.caller_fingerprint,
            request_bytes: params.request_bytes,
            latency_ms: params.latency_ms,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for tool-call events.
pub trait GatewayAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &GatewayAuditEvent);
}

/// Encodes an event as one JSON line, warning when it cannot be encoded.
fn encode_line(event: &GatewayAuditEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(line) => Some(line),
        Err(err) => {
            tracing::warn!(error = %err, tool = event.tool.as_deref(), "audit event not encodable");
            None
        }
    }
}

/// Audit sink that logs JSON lines to stderr.
pub struct GatewayStderrAuditSink;

impl GatewayAuditSink for GatewayStderrAuditSink {
    fn record(&self, event: &GatewayAuditEvent) {
        let Some(line) = encode_line(event) else {
            return;
        };
        let mut stderr = io::stderr().lock();
        if let Err(err) = writeln!(stderr, "{line}") {
            tracing::warn!(error = %err, "audit line not written to stderr");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct GatewayFileAuditSink {
    /// Audit log location, for diagnostics.
    path: PathBuf,
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl GatewayFileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }
}

impl GatewayAuditSink for GatewayFileAuditSink {
    fn record(&self, event: &GatewayAuditEvent) {
        let Some(line) = encode_line(event) else {
            return;
        };
        // A panic mid-write leaves at worst a partial line; keep appending.
        let mut file = self.file.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(path = %self.path.display(), "audit file lock poisoned; recovering");
            PoisonError::into_inner(poisoned)
        });
        let written = writeln!(file, "{line}").and_then(|()| file.flush());
        if let Err(err) = written {
            tracing::warn!(path = %self.path.display(), error = %err, "audit line not written");
        }
    }
}

/// No-op audit sink.
pub struct GatewayNoopAuditSink;

impl GatewayAuditSink for GatewayNoopAuditSink {
    fn record(&self, _event: &GatewayAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
