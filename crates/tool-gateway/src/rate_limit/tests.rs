// crates/tool-gateway/src/rate_limit/tests.rs
// ============================================================================
// Module: Rate Limiter Unit Tests
// Description: Window, ceiling, and isolation behavior of the limiter.
// Purpose: Pin fixed-window admission semantics under a manual clock.
// Dependencies: tool-gateway
// ============================================================================

//! ## Overview
//! Drives [`FixedWindowLimiter`] with a [`ManualClock`] so window boundaries
//! are exact.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::sync::Arc;
use std::time::Duration;

use super::*;

fn limiter() -> (Arc<ManualClock>, FixedWindowLimiter) {
    let clock = Arc::new(ManualClock::new());
    let limiter = FixedWindowLimiter::with_clock(clock.clone());
    (clock, limiter)
}

#[test]
fn admits_up_to_limit_then_rejects() {
    let (_clock, limiter) = limiter();
    for _ in 0 .. 3 {
        assert!(limiter.admit("k", ToolClass::Read, 3));
    }
    for _ in 0 .. 5 {
        assert!(!limiter.admit("k", ToolClass::Read, 3));
    }
    assert_eq!(limiter.bucket("k", ToolClass::Read).unwrap().count, 3);
}

#[test]
fn keys_and_classes_are_isolated() {
    let (_clock, limiter) = limiter();
    assert!(limiter.admit("a", ToolClass::Read, 1));
    assert!(!limiter.admit("a", ToolClass::Read, 1));
    assert!(limiter.admit("a", ToolClass::Write, 1));
    assert!(limiter.admit("b", ToolClass::Read, 1));
    assert_eq!(limiter.tracked_buckets(), 3);
}

#[test]
fn window_resets_at_exactly_sixty_seconds() {
    let (clock, limiter) = limiter();
    assert!(limiter.admit("k", ToolClass::Write, 1));
    clock.advance(RATE_WINDOW - Duration::from_millis(1));
    assert!(!limiter.admit("k", ToolClass::Write, 1));
    clock.advance(Duration::from_millis(1));
    assert!(limiter.admit("k", ToolClass::Write, 1));
    let bucket = limiter.bucket("k", ToolClass::Write).unwrap();
    assert_eq!(bucket.count, 1);
    assert_eq!(bucket.window_start, clock.now());
}

#[test]
fn fixed_window_admits_double_limit_across_boundary() {
    let (clock, limiter) = limiter();
    clock.advance(RATE_WINDOW - Duration::from_secs(1));
    // First window opens here; the limit is spent at its tail end.
    assert!(limiter.admit("k", ToolClass::Read, 2));
    clock.advance(RATE_WINDOW - Duration::from_millis(10));
    assert!(limiter.admit("k", ToolClass::Read, 2));
    clock.advance(Duration::from_millis(10));
    // One window later the counter resets, so 2x limit pass within a short span.
    assert!(limiter.admit("k", ToolClass::Read, 2));
    assert!(limiter.admit("k", ToolClass::Read, 2));
    assert!(!limiter.admit("k", ToolClass::Read, 2));
}

#[test]
fn rejections_do_not_extend_window() {
    let (clock, limiter) = limiter();
    assert!(limiter.admit("k", ToolClass::Read, 1));
    for _ in 0 .. 10 {
        clock.advance(Duration::from_secs(5));
        assert!(!limiter.admit("k", ToolClass::Read, 1));
    }
    clock.advance(Duration::from_secs(10));
    assert!(limiter.admit("k", ToolClass::Read, 1));
}

#[test]
fn concurrent_admits_never_exceed_limit() {
    let (_clock, limiter) = limiter();
    let limiter = Arc::new(limiter);
    let handles: Vec<_> = (0 .. 8)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || {
                (0 .. 50).filter(|_| limiter.admit("k", ToolClass::Write, 100)).count()
            })
        })
        .collect();
    let admitted: usize = handles.into_iter().map(|handle| handle.join().unwrap()).sum();
    assert_eq!(admitted, 100);
    assert_eq!(limiter.bucket("k", ToolClass::Write).unwrap().count, 100);
}
