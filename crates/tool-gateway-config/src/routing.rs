// crates/tool-gateway-config/src/routing.rs
// ============================================================================
// Module: Routing Document
// Description: Declarative upstream routing table for tool calls.
// Purpose: Parse and validate the catalog/policy/provider address map.
// Dependencies: serde, serde_yaml, url
// ============================================================================

//! ## Overview
//! The routing document names a fixed catalog target, a fixed policy target,
//! and a registry of providers, each exposing one or more named servers. It
//! is authored as YAML (JSON documents are accepted as well). Unknown keys
//! are ignored so older documents carrying extra per-route hints still load.
//!
//! ```yaml
//! catalog: { base_url: http://127.0.0.1:4000 }
//! policy: { base_url: http://127.0.0.1:4005 }
//! providers:
//!   payhawk:
//!     servers:
//!       default: { base_url: http://127.0.0.1:4010 }
//! ```

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use url::Url;

use crate::config::ConfigError;
use crate::config::decode_limited_utf8;
use crate::config::read_limited_utf8;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Server slug used when a tool call carries no explicit server hint.
pub const DEFAULT_SERVER_SLUG: &str = "default";
/// Maximum number of providers in one routing document.
pub(crate) const MAX_PROVIDERS: usize = 1024;
/// Maximum number of servers per provider.
pub(crate) const MAX_SERVERS_PER_PROVIDER: usize = 256;
/// Maximum provider or server slug length.
pub(crate) const MAX_SLUG_LENGTH: usize = 128;
/// Maximum base URL length.
pub(crate) const MAX_BASE_URL_LENGTH: usize = 2048;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Routing table document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// Target for catalog, topology, and agent lookups.
    pub catalog: ServiceRoute,
    /// Target for policy computations.
    pub policy: ServiceRoute,
    /// Provider registry keyed by provider slug.
    #[serde(default, deserialize_with = "null_as_default")]
    pub providers: BTreeMap<String, ProviderRoutes>,
}

/// A single upstream target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceRoute {
    /// Base URL tool calls are posted to.
    pub base_url: String,
}

impl ServiceRoute {
    /// Builds a route for the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

/// Servers exposed by one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderRoutes {
    /// Server registry keyed by server slug.
    #[serde(default, deserialize_with = "null_as_default")]
    pub servers: BTreeMap<String, ServiceRoute>,
}

impl RoutingConfig {
    /// Builds a routing table with no providers.
    #[must_use]
    pub fn new(catalog: impl Into<String>, policy: impl Into<String>) -> Self {
        Self {
            catalog: ServiceRoute::new(catalog),
            policy: ServiceRoute::new(policy),
            providers: BTreeMap::new(),
        }
    }

    /// Adds a provider server route, returning the updated table.
    #[must_use]
    pub fn with_server(
        mut self,
        provider: impl Into<String>,
        server: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        self.providers
            .entry(provider.into())
            .or_default()
            .servers
            .insert(server.into(), ServiceRoute::new(base_url));
        self
    }

    /// Parses and validates a routing document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read_limited_utf8(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parses and validates a raw routing document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document is oversized, not UTF-8,
    /// malformed, or invalid.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let content = decode_limited_utf8(bytes.to_vec())?;
        Self::from_yaml_str(&content)
    }

    /// Parses and validates a YAML (or JSON) routing document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document is malformed or invalid.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every slug and base URL in the table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] on the first invalid entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url("catalog.base_url", &self.catalog.base_url)?;
        validate_base_url("policy.base_url", &self.policy.base_url)?;
        if self.providers.len() > MAX_PROVIDERS {
            return Err(ConfigError::Invalid(format!(
                "providers must not exceed {MAX_PROVIDERS} entries"
            )));
        }
        for (provider, routes) in &self.providers {
            validate_slug("provider", provider)?;
            if routes.servers.len() > MAX_SERVERS_PER_PROVIDER {
                return Err(ConfigError::Invalid(format!(
                    "providers.{provider}.servers must not exceed {MAX_SERVERS_PER_PROVIDER} \
                     entries"
                )));
            }
            for (server, route) in &routes.servers {
                validate_slug("server", server)?;
                validate_base_url(
                    &format!("providers.{provider}.servers.{server}.base_url"),
                    &route.base_url,
                )?;
            }
        }
        Ok(())
    }

    /// Returns the base URL registered for a provider server.
    #[must_use]
    pub fn provider_base_url(&self, provider: &str, server: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|routes| routes.servers.get(server))
            .map(|route| route.base_url.as_str())
    }

    /// Returns the number of configured provider servers.
    #[must_use]
    pub fn server_count(&self) -> usize {
        self.providers.values().map(|routes| routes.servers.len()).sum()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Treats an explicit YAML `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Validates a provider or server slug.
fn validate_slug(kind: &str, slug: &str) -> Result<(), ConfigError> {
    if slug.is_empty() {
        return Err(ConfigError::Invalid(format!("{kind} slug must be non-empty")));
    }
    if slug.len() > MAX_SLUG_LENGTH {
        return Err(ConfigError::Invalid(format!("{kind} slug exceeds max length: {slug}")));
    }
    if slug.contains('.') || slug.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(ConfigError::Invalid(format!(
            "{kind} slug must not contain '.' or whitespace: {slug}"
        )));
    }
    Ok(())
}

/// Validates an absolute http(s) base URL.
fn validate_base_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.len() > MAX_BASE_URL_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    let url = Url::parse(value.trim())
        .map_err(|err| ConfigError::Invalid(format!("{field} is not a valid url: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!("{field} must use http:// or https://")));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::Invalid(format!("{field} must include a host")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions use unwrap/expect for clarity."
    )]

    use super::*;

    const SAMPLE: &str = r"
catalog:
  base_url: http://127.0.0.1:4000
policy:
  base_url: http://127.0.0.1:4005
  auth: passthrough
providers:
  payhawk:
    servers:
      default: { base_url: 'http://127.0.0.1:4010' }
      eu: { base_url: 'https://payhawk-eu.internal' }
";

    #[test]
    fn parses_yaml_document_and_ignores_legacy_keys() {
        let config = RoutingConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.catalog.base_url, "http://127.0.0.1:4000");
        assert_eq!(config.provider_base_url("payhawk", "eu"), Some("https://payhawk-eu.internal"));
        assert_eq!(config.server_count(), 2);
    }

    #[test]
    fn accepts_json_documents() {
        let json = r#"{"catalog":{"base_url":"http://c"},"policy":{"base_url":"http://p"}}"#;
        let config = RoutingConfig::from_yaml_str(json).unwrap();
        assert!(config.providers.is_empty());
    }

    #[test]
    fn null_providers_is_empty() {
        let doc = "catalog: {base_url: 'http://c'}\npolicy: {base_url: 'http://p'}\nproviders:\n";
        let config = RoutingConfig::from_yaml_str(doc).unwrap();
        assert!(config.providers.is_empty());
    }

    #[test]
    fn rejects_non_http_scheme() {
        let doc = "catalog: {base_url: 'ftp://c'}\npolicy: {base_url: 'http://p'}\n";
        let err = RoutingConfig::from_yaml_str(doc).unwrap_err();
        assert!(err.to_string().contains("catalog.base_url"));
    }

    #[test]
    fn rejects_dotted_provider_slug() {
        let config = RoutingConfig::new("http://c", "http://p").with_server("a.b", "x", "http://x");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_missing_catalog() {
        let err = RoutingConfig::from_yaml_str("policy: {base_url: 'http://p'}\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_oversized_document() {
        let bytes = vec![b' '; 1024 * 1024 + 1];
        assert!(matches!(RoutingConfig::from_slice(&bytes), Err(ConfigError::Invalid(_))));
    }
}
