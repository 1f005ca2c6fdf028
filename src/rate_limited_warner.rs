//! Rate-limited reporting of dropped messages.
//!
//! Drop conditions such as send-queue eviction can fire thousands of times
//! per second. Callers bump a counter with [`RateLimitedWarner::record_drop`]
//! and emit at most one warning per interval carrying the accumulated count.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Default interval between warnings for the same condition.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

pub type TimeProvider = Box<dyn Fn() -> u64 + Send + Sync>;

/// Seconds since the UNIX epoch, or 0 if the clock is before it.
pub fn system_time_provider() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Counts drops and reports them no more than once per interval.
pub struct RateLimitedWarner {
    last_warn: AtomicU64,
    dropped: AtomicU64,
    interval_secs: u64,
    time_provider: TimeProvider,
}

impl RateLimitedWarner {
    /// Create a warner whose first warning may be emitted immediately.
    pub fn new(interval: Duration) -> Self {
        Self::with_time_provider(interval, Box::new(system_time_provider))
    }

    pub fn with_time_provider(interval: Duration, time_provider: TimeProvider) -> Self {
        let interval_secs = interval.as_secs();
        Self {
            last_warn: AtomicU64::new(time_provider().saturating_sub(interval_secs)),
            dropped: AtomicU64::new(0),
            interval_secs,
            time_provider,
        }
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of drops not yet reported.
    pub fn pending(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Call `warn` with the drop count if the interval has elapsed.
    pub fn warn_if_due(&self, warn: impl FnOnce(u64)) {
        let now = (self.time_provider)();
        let prev = self.last_warn.load(Ordering::Relaxed);
        if now.saturating_sub(prev) < self.interval_secs {
            return;
        }
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn.store(now, Ordering::Relaxed);
        }
    }

    /// Report any outstanding drops regardless of the interval.
    pub fn flush(&self, warn: impl FnOnce(u64)) {
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn
                .store((self.time_provider)(), Ordering::Relaxed);
        }
    }
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

impl std::fmt::Debug for RateLimitedWarner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedWarner")
            .field("dropped", &self.pending())
            .field("interval_secs", &self.interval_secs)
            .finish()
    }
}
