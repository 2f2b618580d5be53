// crates/tool-gateway/src/rate_limit.rs
// ============================================================================
// Module: Rate Limiter
// Description: Fixed-window admission control keyed by caller and class.
// Purpose: Reject calls beyond the per-minute ceiling for a caller/class.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Each `(caller, class)` pair owns one [`RateBucket`]: a window start and
//! the number of calls admitted since. A call arriving at least one window
//! after the start opens a fresh window; otherwise it is admitted only while
//! the count is below the ceiling. A fixed window can admit up to twice the
//! ceiling across a window boundary.
//!
//! Buckets are created lazily and never evicted; their number is bounded by
//! distinct credentials times two classes. All updates go through a single
//! mutex so concurrent admits never lose an increment. Time is read through
//! [`Clock`] so tests can drive windows deterministically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use crate::classify::ToolClass;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed window length.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Monotonic time source for the limiter.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    /// Instant the clock started at.
    origin: Instant,
    /// Time advanced since `origin`.
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset = offset.saturating_add(by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.origin + offset
    }
}

// ============================================================================
// SECTION: Buckets
// ============================================================================

/// Admission state for one `(caller, class)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBucket {
    /// Start of the current window.
    pub window_start: Instant,
    /// Calls admitted since `window_start`.
    pub count: u32,
}

/// Bucket map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    /// Caller credential.
    caller: String,
    /// Tool class.
    class: ToolClass,
}

/// Fixed-window rate limiter.
pub struct FixedWindowLimiter {
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Window length.
    window: Duration,
    /// Buckets keyed by caller and class.
    buckets: Mutex<HashMap<BucketKey, RateBucket>>,
}

impl FixedWindowLimiter {
    /// Creates a limiter on the system clock with a 60 second window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a limiter reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            window: RATE_WINDOW,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admits or rejects one call for `caller` in `class` under `limit`.
    ///
    /// Rejections leave the bucket untouched.
    pub fn admit(&self, caller: &str, class: ToolClass, limit: u32) -> bool {
        let now = self.clock.now();
        let key = BucketKey {
            caller: caller.to_string(),
            class,
        };
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = RateBucket {
            window_start: now,
            count: 1,
        };
        match buckets.get_mut(&key) {
            None => {
                buckets.insert(key, fresh);
                true
            }
            Some(bucket) if now.saturating_duration_since(bucket.window_start) >= self.window => {
                *bucket = fresh;
                true
            }
            Some(bucket) if bucket.count >= limit => false,
            Some(bucket) => {
                bucket.count += 1;
                true
            }
        }
    }

    /// Returns a copy of the bucket for `caller` in `class`, if any.
    #[must_use]
    pub fn bucket(&self, caller: &str, class: ToolClass) -> Option<RateBucket> {
        let key = BucketKey {
            caller: caller.to_string(),
            class,
        };
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).get(&key).copied()
    }

    /// Returns the number of tracked buckets.
    #[must_use]
    pub fn tracked_buckets(&self) -> usize {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
