// crates/tool-gateway-config/src/config.rs
// ============================================================================
// Module: Gateway Configuration
// Description: Configuration loading and validation for the tool gateway.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from an optional TOML file, overlaid with
//! environment overrides, and validated before use. Every setting has a safe
//! default so an empty document yields a runnable local gateway.
//! Security posture: config inputs are untrusted; secrets never appear in
//! `Debug` output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::env::EnvLookup;
use crate::env::process_env;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable used to locate the gateway config file.
pub const CONFIG_ENV_VAR: &str = "TOOL_GATEWAY_CONFIG";
/// Path reserved for the health endpoint.
pub const HEALTH_PATH: &str = "/healthz";
/// Maximum config or routing document size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum secret length in bytes.
pub(crate) const MAX_SECRET_LENGTH: usize = 256;
/// Minimum upstream timeout in milliseconds.
pub(crate) const MIN_UPSTREAM_TIMEOUT_MS: u64 = 100;
/// Maximum upstream timeout in milliseconds.
pub(crate) const MAX_UPSTREAM_TIMEOUT_MS: u64 = 120_000;
/// Maximum calls per minute for a single rate class.
pub(crate) const MAX_RATE_PER_MINUTE: u32 = 100_000;
/// Minimum routing reload interval in milliseconds.
pub(crate) const MIN_RELOAD_INTERVAL_MS: u64 = 100;
/// Maximum routing reload interval in milliseconds.
pub(crate) const MAX_RELOAD_INTERVAL_MS: u64 = 3_600_000;
/// Maximum inbound or upstream body ceiling in bytes.
pub(crate) const MAX_BODY_CEILING_BYTES: usize = 64 * 1024 * 1024;
/// Maximum gateway path length.
pub(crate) const MAX_GATEWAY_PATH_LENGTH: usize = 256;

/// Default listen address.
const DEFAULT_BIND: &str = "127.0.0.1:4020";
/// Default tool-call endpoint path.
const DEFAULT_GATEWAY_PATH: &str = "/mcp";
/// Development secret used when none is configured.
const DEFAULT_API_KEY: &str = "gateway-dev-key";
/// Default routing document path.
const DEFAULT_ROUTES_PATH: &str = "providers.yml";
/// Default inbound body ceiling in bytes.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default upstream response ceiling in bytes.
const DEFAULT_MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;
/// Default upstream call deadline in milliseconds.
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 8_000;
/// Default upstream connect deadline in milliseconds.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;
/// Default read-class ceiling per window.
const DEFAULT_READ_PER_MINUTE: u32 = 60;
/// Default write-class ceiling per window.
const DEFAULT_WRITE_PER_MINUTE: u32 = 30;
/// Default interval reload period in milliseconds.
const DEFAULT_RELOAD_INTERVAL_MS: u64 = 1_000;

// ============================================================================
// SECTION: Secrets
// ============================================================================

/// Secret string whose value is redacted from debug output.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(<redacted>)")
    }
}

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Tool gateway process configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// HTTP listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Caller authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Upstream forwarding configuration.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Per-class rate ceilings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Routing document location and reload policy.
    #[serde(default)]
    pub routing: RoutingSourceConfig,
    /// Request audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl GatewayConfig {
    /// Loads configuration using the default resolution rules and the process
    /// environment for overrides.
    ///
    /// Resolution order: explicit `path`, then [`CONFIG_ENV_VAR`], then
    /// built-in defaults (no file required).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overriding, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, &process_env)
    }

    /// Loads configuration with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overriding, or validation fails.
    pub fn load_with(path: Option<&Path>, lookup: &dyn EnvLookup) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path, lookup)? {
            Some(resolved) => Self::from_file(&resolved)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML config file without applying overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read_limited_utf8(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses a TOML document without applying overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is malformed.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.auth.validate()?;
        self.upstream.validate()?;
        self.rate_limit.validate()?;
        self.routing.validate()?;
        self.audit.validate()
    }

    /// Returns the secret presented to upstreams.
    ///
    /// Falls back to the caller-facing secret when no dedicated upstream
    /// secret is configured.
    #[must_use]
    pub fn upstream_api_key(&self) -> &SecretString {
        self.upstream.api_key.as_ref().unwrap_or(&self.auth.api_key)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Path of the tool-call endpoint.
    #[serde(default = "default_gateway_path")]
    pub gateway_path: String,
    /// Maximum inbound request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            gateway_path: default_gateway_path(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the bind string is malformed.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is invalid: {}", self.bind)))
    }

    /// Validates listener settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        let path = self.gateway_path.as_str();
        if !path.starts_with('/') {
            return Err(ConfigError::Invalid(
                "server.gateway_path must start with '/'".to_string(),
            ));
        }
        if path.len() > MAX_GATEWAY_PATH_LENGTH {
            return Err(ConfigError::Invalid("server.gateway_path exceeds max length".to_string()));
        }
        if path == HEALTH_PATH {
            return Err(ConfigError::Invalid(format!(
                "server.gateway_path must not shadow {HEALTH_PATH}"
            )));
        }
        if path.chars().any(|ch| ch.is_whitespace() || ch == '{' || ch == '}' || ch == '*') {
            return Err(ConfigError::Invalid(
                "server.gateway_path contains unsupported characters".to_string(),
            ));
        }
        // Router parameter and wildcard syntax.
        if path.split('/').any(|segment| segment.starts_with(':') || segment.starts_with('*')) {
            return Err(ConfigError::Invalid(
                "server.gateway_path segments must not start with ':' or '*'".to_string(),
            ));
        }
        validate_body_ceiling("server.max_body_bytes", self.max_body_bytes)
    }
}

/// Caller authentication configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Single caller-facing bearer secret.
    #[serde(default = "default_api_key")]
    pub api_key: SecretString,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
        }
    }
}

impl AuthConfig {
    /// Validates the caller secret.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_secret("auth.api_key", &self.api_key)
    }
}

/// Upstream forwarding configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Secret sent to upstreams; `None` reuses `auth.api_key`.
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Deadline for a single upstream call in milliseconds.
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
    /// Connect deadline in milliseconds, capped by `timeout_ms`.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Maximum accepted upstream response size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout_ms: default_upstream_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl UpstreamConfig {
    /// Returns the upstream call deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the connect deadline, never longer than the call deadline.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.min(self.timeout_ms))
    }

    /// Validates upstream settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(api_key) = &self.api_key {
            validate_secret("upstream.api_key", api_key)?;
        }
        validate_timeout("upstream.timeout_ms", self.timeout_ms)?;
        validate_timeout("upstream.connect_timeout_ms", self.connect_timeout_ms)?;
        validate_body_ceiling("upstream.max_response_bytes", self.max_response_bytes)
    }
}

/// Per-class rate ceilings (calls per fixed one-minute window).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Ceiling for read-class tool calls.
    #[serde(default = "default_read_per_minute")]
    pub read_per_minute: u32,
    /// Ceiling for write-class tool calls.
    #[serde(default = "default_write_per_minute")]
    pub write_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            read_per_minute: default_read_per_minute(),
            write_per_minute: default_write_per_minute(),
        }
    }
}

impl RateLimitConfig {
    /// Validates rate ceilings.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("rate_limit.read_per_minute", self.read_per_minute),
            ("rate_limit.write_per_minute", self.write_per_minute),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
            }
            if value > MAX_RATE_PER_MINUTE {
                return Err(ConfigError::Invalid(format!(
                    "{field} must not exceed {MAX_RATE_PER_MINUTE}"
                )));
            }
        }
        Ok(())
    }
}

/// Routing reload policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadMode {
    /// Refresh the routing snapshot at the start of every tool call.
    PerRequest,
    /// Refresh the routing snapshot from a background timer.
    #[default]
    Interval,
}

/// Routing document location and reload policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingSourceConfig {
    /// Path to the routing document.
    #[serde(default = "default_routes_path")]
    pub path: PathBuf,
    /// Reload policy.
    #[serde(default)]
    pub reload: ReloadMode,
    /// Timer period for [`ReloadMode::Interval`] in milliseconds.
    #[serde(default = "default_reload_interval_ms")]
    pub reload_interval_ms: u64,
}

impl Default for RoutingSourceConfig {
    fn default() -> Self {
        Self {
            path: default_routes_path(),
            reload: ReloadMode::default(),
            reload_interval_ms: default_reload_interval_ms(),
        }
    }
}

impl RoutingSourceConfig {
    /// Returns the reload timer period.
    #[must_use]
    pub const fn reload_interval(&self) -> Duration {
        Duration::from_millis(self.reload_interval_ms)
    }

    /// Validates routing source settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path("routing.path", &self.path)?;
        if self.reload_interval_ms < MIN_RELOAD_INTERVAL_MS
            || self.reload_interval_ms > MAX_RELOAD_INTERVAL_MS
        {
            return Err(ConfigError::Invalid(format!(
                "routing.reload_interval_ms must be between {MIN_RELOAD_INTERVAL_MS} and \
                 {MAX_RELOAD_INTERVAL_MS}"
            )));
        }
        Ok(())
    }
}

/// Request audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Whether request audit events are emitted.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional audit log file; stderr when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path("audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// Parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the CLI argument or environment.
fn resolve_path(
    path: Option<&Path>,
    lookup: &dyn EnvLookup,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    match lookup.get(CONFIG_ENV_VAR) {
        Some(value) if !value.trim().is_empty() => {
            let resolved = PathBuf::from(value.trim());
            validate_path(CONFIG_ENV_VAR, &resolved)?;
            Ok(Some(resolved))
        }
        _ => Ok(None),
    }
}

/// Reads a size-limited UTF-8 document from disk.
pub(crate) fn read_limited_utf8(path: &Path) -> Result<String, ConfigError> {
    validate_path("config path", path)?;
    let bytes = fs::read(path)
        .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    decode_limited_utf8(bytes)
}

/// Enforces the document size limit and UTF-8 encoding.
pub(crate) fn decode_limited_utf8(bytes: Vec<u8>) -> Result<String, ConfigError> {
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config document exceeds size limit".to_string()));
    }
    String::from_utf8(bytes)
        .map_err(|_| ConfigError::Invalid("config document must be utf-8".to_string()))
}

/// Validates a path against length limits.
pub(crate) fn validate_path(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a shared secret for presence, length, and whitespace.
fn validate_secret(field: &str, secret: &SecretString) -> Result<(), ConfigError> {
    let value = secret.expose();
    if value.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_SECRET_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    if value.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(ConfigError::Invalid(format!("{field} must not contain whitespace")));
    }
    Ok(())
}

/// Validates a deadline against the upstream timeout bounds.
fn validate_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if !(MIN_UPSTREAM_TIMEOUT_MS ..= MAX_UPSTREAM_TIMEOUT_MS).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between {MIN_UPSTREAM_TIMEOUT_MS} and {MAX_UPSTREAM_TIMEOUT_MS}"
        )));
    }
    Ok(())
}

/// Validates a byte ceiling.
fn validate_body_ceiling(field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
    }
    if value > MAX_BODY_CEILING_BYTES {
        return Err(ConfigError::Invalid(format!("{field} too large")));
    }
    Ok(())
}

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default gateway path.
fn default_gateway_path() -> String {
    DEFAULT_GATEWAY_PATH.to_string()
}

/// Default maximum request body size in bytes.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default caller secret.
fn default_api_key() -> SecretString {
    SecretString::new(DEFAULT_API_KEY)
}

/// Default upstream deadline.
const fn default_upstream_timeout_ms() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_MS
}

/// Default connect deadline.
const fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// Default maximum upstream response size in bytes.
const fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

/// Default read ceiling.
const fn default_read_per_minute() -> u32 {
    DEFAULT_READ_PER_MINUTE
}

/// Default write ceiling.
const fn default_write_per_minute() -> u32 {
    DEFAULT_WRITE_PER_MINUTE
}

/// Default routing document path.
fn default_routes_path() -> PathBuf {
    PathBuf::from(DEFAULT_ROUTES_PATH)
}

/// Default reload interval.
const fn default_reload_interval_ms() -> u64 {
    DEFAULT_RELOAD_INTERVAL_MS
}

/// Audit logging is on unless disabled.
const fn default_audit_enabled() -> bool {
    true
}

// ============================================================================
// SECTION: Tests
// ============================================================================
