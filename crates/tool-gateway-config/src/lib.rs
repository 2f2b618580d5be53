// crates/tool-gateway-config/src/lib.rs
// ============================================================================
// Module: Tool Gateway Config Library
// Description: Canonical config model and validation for the tool gateway.
// Purpose: Single source of truth for gateway.toml and providers.yml semantics.
// Dependencies: serde, serde_yaml, toml, url
// ============================================================================

//! ## Overview
//! `tool-gateway-config` defines the configuration consumed by the gateway
//! process: the process-level settings (TOML, with environment overrides) and
//! the routing document (YAML) that maps tool calls to upstream base URLs.
//! Validation is strict and fails closed.
//!
//! Security posture: config inputs are untrusted and size-limited.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod env;
pub mod routing;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use env::*;
pub use routing::*;
