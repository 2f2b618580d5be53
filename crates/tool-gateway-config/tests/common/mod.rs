// crates/tool-gateway-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config and routing validation tests.
// Purpose: Reduce duplication across integration tests for tool-gateway-config.
// =============================================================================

#![allow(
    dead_code,
    clippy::expect_used,
    reason = "Test helpers are selectively used across suites."
)]

use std::io::Write;

use tempfile::NamedTempFile;

/// Environment lookup that reports every variable as unset.
pub fn no_env(_key: &str) -> Option<String> {
    None
}

/// Writes `content` to a fresh temporary file.
pub fn temp_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

/// A routing document with one provider exposing two servers.
pub const ROUTES_YAML: &str = "\
catalog:
  base_url: http://127.0.0.1:4000
policy:
  base_url: http://127.0.0.1:4005
providers:
  acme:
    servers:
      default:
        base_url: http://x
      eu:
        base_url: https://acme-eu.example
";
