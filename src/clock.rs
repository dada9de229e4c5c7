//! Monotonic millisecond time source.
//!
//! The original implementation reads a process-wide clock singleton
//! (`m_clock`) initialized once at library load. A clean design injects the
//! clock per endpoint instead: it removes the global, and lets tests
//! simulate `RATCHET_PERIOD`/`RATCHET_REMOTE_TIMEOUT` elapsing without
//! actually sleeping for two minutes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A source of monotonically non-decreasing milliseconds.
///
/// Implementations are not required to track wall-clock time — only that
/// successive calls never go backwards, matching the single-threaded,
/// calling-thread-only timing model in the specification's concurrency
/// section.
pub trait Clock: Send {
    fn now_ms(&self) -> u64;
}

/// Default clock, backed by [`std::time::Instant`].
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// A clock that only advances when told to. Used by tests that exercise
/// ratchet timing (`RATCHET_PERIOD`, `RATCHET_REMOTE_TIMEOUT`) without
/// real delays.
pub struct FakeClock {
    now: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
