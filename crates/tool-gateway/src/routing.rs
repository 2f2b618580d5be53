// crates/tool-gateway/src/routing.rs
// ============================================================================
// Module: Routing Store
// Description: Reloadable routing snapshot and tool-to-target resolution.
// Purpose: Map tool calls to upstream base URLs without restarts.
// Dependencies: arc-swap, async-trait, sha2, tokio, tool-gateway-config, tracing
// ============================================================================

//! ## Overview
//! The routing table is held as an immutable [`RoutingConfig`] snapshot
//! in an `ArcSwap`, so request-path reads never take a lock. A refresh
//! fetches the raw document from a [`RoutingSource`], parses and validates
//! it, and swaps the whole snapshot in one step, so readers see either the
//! old or the new table. Documents
//! whose SHA-256 digest matches the last applied one are not reparsed. A
//! failed refresh keeps the previous snapshot.
//!
//! Resolution rules, in order: catalog tools go to `catalog`, `policy.`
//! tools go to `policy`, and everything else goes to
//! `providers[<tool prefix>][<server hint or default>]`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tool_gateway_config::ConfigError;
use tool_gateway_config::DEFAULT_SERVER_SLUG;
use tool_gateway_config::RoutingConfig;

use crate::classify::is_catalog_tool;
use crate::classify::is_policy_tool;

// ============================================================================
// SECTION: Sources
// ============================================================================

/// Supplier of the raw routing document.
#[async_trait]
pub trait RoutingSource: Send + Sync {
    /// Fetches the current document bytes.
    async fn fetch(&self) -> Result<Vec<u8>, ConfigError>;

    /// Returns a human-readable description for diagnostics.
    fn describe(&self) -> String;
}

/// Routing document read from the filesystem on every fetch.
#[derive(Debug, Clone)]
pub struct FileRoutingSource {
    /// Document path.
    path: PathBuf,
}

impl FileRoutingSource {
    /// Creates a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RoutingSource for FileRoutingSource {
    async fn fetch(&self) -> Result<Vec<u8>, ConfigError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|err| ConfigError::Io(format!("{}: {err}", self.path.display())))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory routing document that can be replaced at runtime.
#[derive(Debug, Default)]
pub struct StaticRoutingSource {
    /// Current document bytes.
    document: RwLock<Vec<u8>>,
}

impl StaticRoutingSource {
    /// Creates a source serving `document`.
    #[must_use]
    pub fn new(document: impl Into<Vec<u8>>) -> Self {
        Self {
            document: RwLock::new(document.into()),
        }
    }

    /// Replaces the served document.
    pub fn replace(&self, document: impl Into<Vec<u8>>) {
        *self.document.write().unwrap_or_else(PoisonError::into_inner) = document.into();
    }
}

#[async_trait]
impl RoutingSource for StaticRoutingSource {
    async fn fetch(&self) -> Result<Vec<u8>, ConfigError> {
        Ok(self.document.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn describe(&self) -> String {
        "in-memory routing document".to_string()
    }
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Kind of upstream a tool call resolved to.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Catalog lookup service.
    Catalog,
    /// Policy computation service.
    Policy,
    /// Provider server.
    Provider,
}

impl TargetKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Policy => "policy",
            Self::Provider => "provider",
        }
    }
}

/// Destination of a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Target kind.
    pub kind: TargetKind,
    /// Base URL the call is posted to.
    pub address: String,
    /// Provider and server slugs for provider targets.
    pub provider: Option<(String, String)>,
}

/// No route exists for the attempted provider/server pair.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown_provider_or_server: {provider}/{server}")]
pub struct UnknownTarget {
    /// Provider slug derived from the tool name.
    pub provider: String,
    /// Server slug from the hint or the default.
    pub server: String,
}

/// Resolves `tool` against `routes`.
///
/// # Errors
///
/// Returns [`UnknownTarget`] when a provider-routed tool has no configured
/// server.
pub fn resolve_target(
    routes: &RoutingConfig,
    tool: &str,
    server_hint: Option<&str>,
) -> Result<ResolvedTarget, UnknownTarget> {
    if is_catalog_tool(tool) {
        return Ok(ResolvedTarget {
            kind: TargetKind::Catalog,
            address: routes.catalog.base_url.clone(),
            provider: None,
        });
    }
    if is_policy_tool(tool) {
        return Ok(ResolvedTarget {
            kind: TargetKind::Policy,
            address: routes.policy.base_url.clone(),
            provider: None,
        });
    }
    let provider = tool.split_once('.').map_or(tool, |(provider, _)| provider);
    let server = server_hint.filter(|hint| !hint.is_empty()).unwrap_or(DEFAULT_SERVER_SLUG);
    routes.provider_base_url(provider, server).map_or_else(
        || {
            Err(UnknownTarget {
                provider: provider.to_string(),
                server: server.to_string(),
            })
        },
        |address| {
            Ok(ResolvedTarget {
                kind: TargetKind::Provider,
                address: address.to_string(),
                provider: Some((provider.to_string(), server.to_string())),
            })
        },
    )
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Result of a successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was installed.
    Updated,
    /// The document was unchanged; the snapshot was kept.
    Unchanged,
}

/// Atomically swapped routing snapshot fed by a [`RoutingSource`].
pub struct RoutingStore {
    /// Document supplier.
    source: Arc<dyn RoutingSource>,
    /// Current snapshot.
    current: ArcSwap<RoutingConfig>,
    /// Digest of the applied document; also serializes refreshes.
    applied_digest: Mutex<[u8; 32]>,
}

impl RoutingStore {
    /// Loads the initial snapshot from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document cannot be fetched, parsed,
    /// or validated. Startup fails closed on a bad initial document.
    pub async fn load(source: Arc<dyn RoutingSource>) -> Result<Self, ConfigError> {
        let document = source.fetch().await?;
        let config = RoutingConfig::from_slice(&document)?;
        Ok(Self {
            source,
            current: ArcSwap::from_pointee(config),
            applied_digest: Mutex::new(digest(&document)),
        })
    }

    /// Creates a store around an already validated snapshot.
    #[must_use]
    pub fn from_snapshot(source: Arc<dyn RoutingSource>, config: RoutingConfig) -> Self {
        Self {
            source,
            current: ArcSwap::from_pointee(config),
            applied_digest: Mutex::new([0; 32]),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RoutingConfig> {
        self.current.load_full()
    }

    /// Returns the source description.
    #[must_use]
    pub fn source_description(&self) -> String {
        self.source.describe()
    }

    /// Re-reads the source and installs the document if it changed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document cannot be fetched, parsed,
    /// or validated; the previous snapshot stays in effect.
    pub async fn refresh(&self) -> Result<RefreshOutcome, ConfigError> {
        let mut applied = self.applied_digest.lock().await;
        let document = self.source.fetch().await?;
        let fresh_digest = digest(&document);
        if fresh_digest == *applied {
            return Ok(RefreshOutcome::Unchanged);
        }
        let config = RoutingConfig::from_slice(&document)?;
        self.current.store(Arc::new(config));
        *applied = fresh_digest;
        Ok(RefreshOutcome::Updated)
    }

    /// Refreshes and logs failures instead of returning them.
    pub async fn refresh_or_warn(&self) {
        match self.refresh().await {
            Ok(RefreshOutcome::Updated) => {
                tracing::info!(source = %self.source.describe(), "routing table reloaded");
            }
            Ok(RefreshOutcome::Unchanged) => {}
            Err(err) => {
                tracing::warn!(
                    source = %self.source.describe(),
                    error = %err,
                    "routing reload failed; keeping previous table"
                );
            }
        }
    }

    /// Resolves `tool` against the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownTarget`] when no route exists.
    pub fn resolve(
        &self,
        tool: &str,
        server_hint: Option<&str>,
    ) -> Result<ResolvedTarget, UnknownTarget> {
        resolve_target(&self.snapshot(), tool, server_hint)
    }

    /// Spawns a background task refreshing the store every `interval`.
    #[must_use]
    pub fn spawn_reloader(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.refresh_or_warn().await;
            }
        })
    }
}

/// SHA-256 digest of a routing document.
fn digest(document: &[u8]) -> [u8; 32] {
    Sha256::digest(document).into()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
