//! Time source used to stamp outbound messages and presence snapshots.
//!
//! Kept as a trait (rather than calling `SystemTime::now()` directly from
//! the Hub) so tests can supply a deterministic clock without needing a
//! full virtual-time simulation harness.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds-since-epoch time source.
pub trait Clock: Send + Sync {
    /// Current time, in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("invariant: system clock is after the Unix epoch")
            .as_millis() as u64
    }
}
