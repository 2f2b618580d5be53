// crates/tool-gateway/src/telemetry.rs
// ============================================================================
// Module: Gateway Telemetry
// Description: Metric hooks for tool-call counters and latencies.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A thin metrics interface for per-call counters and latency histograms.
//! Deployments plug in their own exporter by implementing
//! [`GatewayMetrics`]; the default sink discards everything. Labels never
//! carry credentials or tool inputs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Serialize;

use crate::classify::ToolClass;
use crate::routing::TargetKind;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for tool-call histograms.
pub const GATEWAY_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Tool-call outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Call answered with 200.
    Ok,
    /// Call answered with an error envelope.
    Error,
}

impl RequestOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Tool-call metric event payload.
///
/// # Invariants
/// - Optional fields are `None` when the pipeline stopped before computing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayMetricEvent {
    /// Tool class when the call got that far.
    pub class: Option<ToolClass>,
    /// Resolved target kind.
    pub target: Option<TargetKind>,
    /// Call outcome.
    pub outcome: RequestOutcome,
    /// HTTP status returned to the caller.
    pub status: u16,
    /// Error code when the call failed.
    pub error_code: Option<String>,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for tool calls.
pub trait GatewayMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: &GatewayMetricEvent);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: &GatewayMetricEvent, latency: Duration);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are discarded.
pub struct NoopMetrics;

impl GatewayMetrics for NoopMetrics {
    fn record_request(&self, _event: &GatewayMetricEvent) {}

    fn record_latency(&self, _event: &GatewayMetricEvent, _latency: Duration) {}
}
