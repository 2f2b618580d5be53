// crates/tool-gateway/tests/upstream_forwarder.rs
// ============================================================================
// Module: Upstream Forwarder Tests
// Description: Forwarder behavior against scripted HTTP upstreams.
// Purpose: Pin the error codes for timeouts, statuses, and bad payloads.
// Dependencies: tool-gateway, axum, tokio
// ============================================================================

//! ## Overview
//! Each test points an [`UpstreamForwarder`] at an in-process stub and checks
//! the normalized envelope.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

mod common;

use std::time::Duration;
use std::time::Instant;

use common::StubReply;
use common::UpstreamStub;
use serde_json::json;
use tool_gateway::ToolErrorBody;
use tool_gateway::ToolResponseEnvelope;
use tool_gateway::UpstreamError;
use tool_gateway::UpstreamForwarder;
use tool_gateway::UpstreamSettings;
use tool_gateway_config::SecretString;

fn forwarder(timeout: Duration) -> UpstreamForwarder {
    UpstreamForwarder::new(UpstreamSettings {
        api_key: SecretString::new("upstream-key"),
        timeout,
        connect_timeout: timeout,
        max_response_bytes: 1024,
    })
    .unwrap()
}

fn error_of(envelope: &ToolResponseEnvelope) -> ToolErrorBody {
    envelope.error().expect("expected error envelope")
}

#[tokio::test]
async fn posts_tool_and_input_with_bearer() {
    let stub = UpstreamStub::spawn(StubReply::json(&json!({"ok": true}))).await;
    let input = json!({"employee": "e1", "days": 3});
    let envelope =
        forwarder(Duration::from_secs(2)).forward(stub.base_url(), "payhawk.pay", Some(&input)).await;
    assert_eq!(envelope, ToolResponseEnvelope::json(json!({"ok": true})));
    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer upstream-key"));
    assert_eq!(requests[0].body, json!({"tool": "payhawk.pay", "input": input}));
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let stub = UpstreamStub::spawn(
        StubReply::json(&json!({"late": true})).delayed(Duration::from_secs(5)),
    )
    .await;
    let started = Instant::now();
    let envelope = forwarder(Duration::from_millis(200)).forward(stub.base_url(), "a.b", None).await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(error_of(&envelope), ToolErrorBody::new("upstream_timeout", "Upstream request timed out"));
}

#[tokio::test]
async fn status_error_uses_embedded_message() {
    let stub =
        UpstreamStub::spawn(StubReply::raw(500, json!({"error": {"message": "boom"}}).to_string()))
            .await;
    let envelope = forwarder(Duration::from_secs(2)).forward(stub.base_url(), "a.b", None).await;
    assert_eq!(error_of(&envelope), ToolErrorBody::new("upstream_500", "boom"));
}

#[tokio::test]
async fn status_error_falls_back_to_status_text() {
    let stub = UpstreamStub::spawn(StubReply::raw(502, "<html>bad gateway</html>")).await;
    let envelope = forwarder(Duration::from_secs(2)).forward(stub.base_url(), "a.b", None).await;
    assert_eq!(error_of(&envelope), ToolErrorBody::new("upstream_502", "Bad Gateway"));
}

#[tokio::test]
async fn oversized_error_body_still_reports_status() {
    let stub = UpstreamStub::spawn(StubReply::raw(502, "x".repeat(4096))).await;
    let envelope = forwarder(Duration::from_secs(2)).forward(stub.base_url(), "a.b", None).await;
    assert_eq!(error_of(&envelope), ToolErrorBody::new("upstream_502", "Bad Gateway"));
}

#[tokio::test]
async fn embedded_error_on_success_keeps_extra_fields() {
    let body = json!({"error": {"code": "policy_denied", "message": "no", "details": ["cap"]}});
    let stub = UpstreamStub::spawn(StubReply::json(&body)).await;
    let envelope = forwarder(Duration::from_secs(2)).forward(stub.base_url(), "a.b", None).await;
    assert_eq!(serde_json::to_value(&envelope).unwrap(), body);
}

#[tokio::test]
async fn non_json_success_is_invalid_payload() {
    let stub = UpstreamStub::spawn(StubReply::raw(200, "not json")).await;
    let result = forwarder(Duration::from_secs(2)).call(stub.base_url(), "a.b", None).await;
    assert_eq!(result, Err(UpstreamError::InvalidPayload));
    let envelope = forwarder(Duration::from_secs(2)).forward(stub.base_url(), "a.b", None).await;
    assert_eq!(error_of(&envelope).code, "invalid_json");
}

#[tokio::test]
async fn refused_connection_is_upstream_failure() {
    let url = common::closed_port_url().await;
    let envelope = forwarder(Duration::from_secs(2)).forward(&url, "a.b", None).await;
    let error = error_of(&envelope);
    assert_eq!(error.code, "upstream_failure");
    assert!(!error.message.is_empty());
}

#[tokio::test]
async fn oversized_response_is_rejected() {
    let stub = UpstreamStub::spawn(StubReply::json(&json!({"blob": "x".repeat(4096)}))).await;
    let envelope = forwarder(Duration::from_secs(2)).forward(stub.base_url(), "a.b", None).await;
    assert_eq!(error_of(&envelope), ToolErrorBody::new("upstream_failure", "upstream response too large"));
}

#[tokio::test]
async fn embedded_error_on_success_is_surfaced() {
    let stub = UpstreamStub::spawn(StubReply::json(
        &json!({"error": {"code": "policy_denied", "message": "over budget"}}),
    ))
    .await;
    let envelope = forwarder(Duration::from_secs(2)).forward(stub.base_url(), "a.b", None).await;
    assert_eq!(error_of(&envelope), ToolErrorBody::new("policy_denied", "over budget"));
}

#[tokio::test]
async fn each_call_is_a_single_attempt() {
    let stub = UpstreamStub::spawn(StubReply::raw(503, "{}")).await;
    let _ = forwarder(Duration::from_secs(2)).forward(stub.base_url(), "a.b", None).await;
    assert_eq!(stub.requests().len(), 1);
}
