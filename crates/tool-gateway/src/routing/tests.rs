// crates/tool-gateway/src/routing/tests.rs
// ============================================================================
// Module: Routing Store Unit Tests
// Description: Resolution rules and snapshot refresh behavior.
// Purpose: Ensure routing follows the fixed rules and never tears or regresses.
// Dependencies: tool-gateway, tokio
// ============================================================================

//! ## Overview
//! Covers the resolver rule order and [`RoutingStore`] refresh semantics with
//! an in-memory source.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use super::*;

const DOC_V1: &str = r"
catalog: { base_url: 'http://127.0.0.1:4000' }
policy: { base_url: 'http://127.0.0.1:4005' }
providers:
  acme:
    servers:
      default: { base_url: 'http://x' }
      eu: { base_url: 'http://acme-eu' }
";

const DOC_V2: &str = r"
catalog: { base_url: 'http://127.0.0.1:4000' }
policy: { base_url: 'http://127.0.0.1:4005' }
providers:
  acme:
    servers:
      default: { base_url: 'http://y' }
  brex:
    servers:
      default: { base_url: 'http://brex' }
";

fn routes() -> RoutingConfig {
    RoutingConfig::from_yaml_str(DOC_V1).unwrap()
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

#[test]
fn provider_tool_uses_default_server() {
    let target = resolve_target(&routes(), "acme.do_thing", None).unwrap();
    assert_eq!(target.address, "http://x");
    assert_eq!(target.kind, TargetKind::Provider);
    assert_eq!(target.provider, Some(("acme".to_string(), "default".to_string())));
}

#[test]
fn server_hint_selects_server() {
    let target = resolve_target(&routes(), "acme.do_thing", Some("eu")).unwrap();
    assert_eq!(target.address, "http://acme-eu");
}

#[test]
fn empty_hint_falls_back_to_default() {
    let target = resolve_target(&routes(), "acme.do_thing", Some("")).unwrap();
    assert_eq!(target.address, "http://x");
}

#[test]
fn catalog_and_policy_tools_use_fixed_targets() {
    for tool in ["catalog.search", "process.topology", "agents.describe"] {
        let target = resolve_target(&routes(), tool, Some("eu")).unwrap();
        assert_eq!(target.kind, TargetKind::Catalog);
        assert_eq!(target.address, "http://127.0.0.1:4000");
    }
    let target = resolve_target(&routes(), "policy.per_diem_amount", None).unwrap();
    assert_eq!(target.kind, TargetKind::Policy);
    assert_eq!(target.address, "http://127.0.0.1:4005");
}

#[test]
fn unknown_provider_or_server_fails() {
    let err = resolve_target(&routes(), "nobody.do_thing", None).unwrap_err();
    assert_eq!(
        err,
        UnknownTarget {
            provider: "nobody".to_string(),
            server: "default".to_string(),
        }
    );
    assert_eq!(err.to_string(), "unknown_provider_or_server: nobody/default");
    let err = resolve_target(&routes(), "acme.do_thing", Some("apac")).unwrap_err();
    assert_eq!(err.server, "apac");
}

#[test]
fn undotted_tool_uses_whole_name_as_provider() {
    let err = resolve_target(&routes(), "acme", Some("missing")).unwrap_err();
    assert_eq!(err.provider, "acme");
    assert!(resolve_target(&routes(), "acme", None).is_ok());
}

// ============================================================================
// SECTION: Refresh
// ============================================================================

#[tokio::test]
async fn refresh_swaps_snapshot_and_skips_unchanged() {
    let source = Arc::new(StaticRoutingSource::new(DOC_V1));
    let store = RoutingStore::load(source.clone()).await.unwrap();
    let before = store.snapshot();
    assert_eq!(store.refresh().await.unwrap(), RefreshOutcome::Unchanged);
    assert!(Arc::ptr_eq(&before, &store.snapshot()));

    source.replace(DOC_V2);
    assert_eq!(store.refresh().await.unwrap(), RefreshOutcome::Updated);
    assert_eq!(store.resolve("acme.do_thing", None).unwrap().address, "http://y");
    assert_eq!(store.resolve("brex.pay", None).unwrap().address, "http://brex");
    // Readers holding the old snapshot keep a complete table.
    assert_eq!(before.provider_base_url("acme", "default"), Some("http://x"));
}

#[test]
fn readers_see_whole_tables_while_refreshing() {
    let source = Arc::new(StaticRoutingSource::new(DOC_V1));
    let store = RoutingStore::from_snapshot(source.clone(), routes());
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..500 {
                    let snapshot = store.snapshot();
                    let acme = snapshot.provider_base_url("acme", "default");
                    let brex = snapshot.provider_base_url("brex", "default");
                    let whole_v1 = acme == Some("http://x") && brex.is_none();
                    let whole_v2 = acme == Some("http://y") && brex == Some("http://brex");
                    assert!(whole_v1 || whole_v2);
                }
            });
        }
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        for round in 0..50 {
            source.replace(if round % 2 == 0 { DOC_V2 } else { DOC_V1 });
            runtime.block_on(store.refresh()).unwrap();
        }
    });
}

#[tokio::test]
async fn failed_refresh_keeps_last_good_table() {
    let source = Arc::new(StaticRoutingSource::new(DOC_V1));
    let store = RoutingStore::load(source.clone()).await.unwrap();
    source.replace("catalog: [not, a, route");
    assert!(matches!(store.refresh().await, Err(ConfigError::Parse(_))));
    source.replace("catalog: {base_url: 'nope'}\npolicy: {base_url: 'http://p'}\n");
    assert!(matches!(store.refresh().await, Err(ConfigError::Invalid(_))));
    store.refresh_or_warn().await;
    assert_eq!(store.resolve("acme.do_thing", Some("eu")).unwrap().address, "http://acme-eu");

    source.replace(DOC_V1);
    assert_eq!(store.refresh().await.unwrap(), RefreshOutcome::Unchanged);
}

#[tokio::test]
async fn initial_load_fails_closed() {
    let source = Arc::new(StaticRoutingSource::new("providers: {}"));
    assert!(RoutingStore::load(source).await.is_err());
    let missing = Arc::new(FileRoutingSource::new("/nonexistent/providers.yml"));
    assert!(matches!(RoutingStore::load(missing).await, Err(ConfigError::Io(_))));
}

#[tokio::test]
async fn file_source_picks_up_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("providers.yml");
    tokio::fs::write(&path, DOC_V1).await.unwrap();
    let source = Arc::new(FileRoutingSource::new(&path));
    let store = RoutingStore::load(source).await.unwrap();
    tokio::fs::write(&path, DOC_V2).await.unwrap();
    assert_eq!(store.refresh().await.unwrap(), RefreshOutcome::Updated);
    assert_eq!(store.resolve("acme.x", None).unwrap().address, "http://y");
}

#[tokio::test(start_paused = true)]
async fn reloader_task_refreshes_on_interval() {
    let source = Arc::new(StaticRoutingSource::new(DOC_V1));
    let store = Arc::new(RoutingStore::load(source.clone()).await.unwrap());
    let handle = store.spawn_reloader(Duration::from_millis(500));
    source.replace(DOC_V2);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(store.resolve("acme.x", None).unwrap().address, "http://y");
    handle.abort();
}
