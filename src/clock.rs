//! Wall-clock abstraction used for token expiry decisions.
//!
//! Timers (refresh interval, heartbeat, reconnect backoff) run on tokio time;
//! only the comparison against a token's `exp` claim goes through [`Clock`],
//! so tests can move "now" across an expiry boundary without sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current Unix time.
pub trait Clock: Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> i64 {
        self.now_ms().div_euclid(1000)
    }
}

/// Reference-counted [`Clock`].
pub type ArcClock = Arc<dyn Clock>;

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `secs` seconds since the epoch.
    pub fn at_secs(secs: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(secs * 1000),
        }
    }

    /// Jump to an absolute time in seconds.
    pub fn set_secs(&self, secs: i64) {
        self.now_ms.store(secs * 1000, Ordering::SeqCst);
    }

    /// Move forward by `secs` seconds.
    pub fn advance_secs(&self, secs: i64) {
        self.now_ms.fetch_add(secs * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::at_secs(100);
        assert_eq!(clock.now_secs(), 100);
        clock.advance_secs(5);
        assert_eq!(clock.now_ms(), 105_000);
        clock.set_secs(7);
        assert_eq!(clock.now_secs(), 7);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }
}
