// crates/tool-gateway-config/src/env.rs
// ============================================================================
// Module: Environment Overrides
// Description: Environment variable overlay for gateway configuration.
// Purpose: Let each operational knob be overridden independently.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Environment overrides are applied after the config file is parsed and
//! before validation. Lookups go through [`EnvLookup`] so tests can supply a
//! fabricated environment instead of mutating the process environment.
//! Malformed override values fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::ConfigError;
use crate::config::GatewayConfig;
use crate::config::SecretString;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Overrides the listen port, keeping the bind IP.
pub const PORT_ENV: &str = "TOOL_GATEWAY_PORT";
/// Overrides the full bind address.
pub const BIND_ENV: &str = "TOOL_GATEWAY_BIND";
/// Overrides the caller-facing secret.
pub const API_KEY_ENV: &str = "TOOL_GATEWAY_API_KEY";
/// Overrides the upstream-facing secret.
pub const UPSTREAM_API_KEY_ENV: &str = "TOOL_GATEWAY_UPSTREAM_API_KEY";
/// Overrides the routing document path.
pub const ROUTES_FILE_ENV: &str = "TOOL_GATEWAY_ROUTES_FILE";
/// Overrides the upstream call deadline.
pub const UPSTREAM_TIMEOUT_ENV: &str = "TOOL_GATEWAY_UPSTREAM_TIMEOUT_MS";
/// Overrides the read-class ceiling.
pub const RATE_READ_ENV: &str = "TOOL_GATEWAY_RATE_READ_RPM";
/// Overrides the write-class ceiling.
pub const RATE_WRITE_ENV: &str = "TOOL_GATEWAY_RATE_WRITE_RPM";

// ============================================================================
// SECTION: Lookup
// ============================================================================

/// Source of environment variable values.
pub trait EnvLookup {
    /// Returns the value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

impl<F> EnvLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// Reads variables from the process environment.
#[must_use]
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ============================================================================
// SECTION: Overlay
// ============================================================================

impl GatewayConfig {
    /// Applies environment overrides on top of the parsed configuration.
    ///
    /// `TOOL_GATEWAY_BIND` is applied before `TOOL_GATEWAY_PORT` so both can
    /// be combined.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an override value is malformed.
    pub fn apply_overrides(&mut self, lookup: &dyn EnvLookup) -> Result<(), ConfigError> {
        if let Some(bind) = non_empty(lookup, BIND_ENV) {
            self.server.bind = bind;
        }
        if let Some(port) = parse_var::<u16>(lookup, PORT_ENV)? {
            let mut addr: SocketAddr = self.server.bind_addr()?;
            addr.set_port(port);
            self.server.bind = addr.to_string();
        }
        if let Some(api_key) = non_empty(lookup, API_KEY_ENV) {
            self.auth.api_key = SecretString::new(api_key);
        }
        if let Some(api_key) = non_empty(lookup, UPSTREAM_API_KEY_ENV) {
            self.upstream.api_key = Some(SecretString::new(api_key));
        }
        if let Some(path) = non_empty(lookup, ROUTES_FILE_ENV) {
            self.routing.path = PathBuf::from(path);
        }
        if let Some(timeout_ms) = parse_var::<u64>(lookup, UPSTREAM_TIMEOUT_ENV)? {
            self.upstream.timeout_ms = timeout_ms;
        }
        if let Some(read) = parse_var::<u32>(lookup, RATE_READ_ENV)? {
            self.rate_limit.read_per_minute = read;
        }
        if let Some(write) = parse_var::<u32>(lookup, RATE_WRITE_ENV)? {
            self.rate_limit.write_per_minute = write;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns a trimmed, non-blank variable value.
fn non_empty(lookup: &dyn EnvLookup, key: &str) -> Option<String> {
    lookup.get(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

/// Parses a non-blank variable value, failing closed on malformed input.
fn parse_var<T: FromStr>(lookup: &dyn EnvLookup, key: &str) -> Result<Option<T>, ConfigError> {
    let Some(raw) = non_empty(lookup, key) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::Invalid(format!("{key} has an invalid value: {raw}")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
