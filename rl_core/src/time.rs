use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;

use crate::limiter::Nanos;

/// Source of the `now` value passed to limiters
pub trait Clock: Send + Sync {
    /// Current monotonic time in nanoseconds
    fn now_nanos(&self) -> Nanos;
}

/// Monotonic time since the source was created
///
/// Backed by [`tokio::time::Instant`], so a paused tokio runtime drives it too.
#[derive(Debug, Clone, Copy)]
pub struct TimeSource {
    /// Epoch for relative time measurements
    epoch: Instant,
}

impl TimeSource {
    /// Create a new time source with current time as epoch
    #[inline(always)]
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TimeSource {
    #[inline(always)]
    fn now_nanos(&self) -> Nanos {
        duration_to_nanos(self.epoch.elapsed())
    }
}

/// Clock that only moves when told to
///
/// Used by deterministic drivers and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Nanos) -> Self {
        Self { now: AtomicI64::new(start) }
    }

    pub fn set(&self, now: Nanos) {
        self.now.store(now, Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        let delta = duration_to_nanos(by);
        // fetch_update only fails when the closure returns None
        let _ = self.now.fetch_update(Ordering::AcqRel, Ordering::Acquire, |now| Some(now.saturating_add(delta)));
    }
}

impl Clock for ManualClock {
    #[inline(always)]
    fn now_nanos(&self) -> Nanos {
        self.now.load(Ordering::Acquire)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_nanos(&self) -> Nanos {
        (**self).now_nanos()
    }
}

/// Convert a duration to nanoseconds, clamping at `i64::MAX`
#[inline(always)]
pub fn duration_to_nanos(duration: Duration) -> Nanos {
    Nanos::try_from(duration.as_nanos()).unwrap_or(Nanos::MAX)
}

/// Convert nanoseconds to a duration; negative values become zero
#[inline(always)]
pub fn nanos_to_duration(nanos: Nanos) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_source() {
        let ts = TimeSource::new();
        let t1 = ts.now_nanos();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = ts.now_nanos();

        assert!(t2 > t1);
        assert!(t2 - t1 >= duration_to_nanos(Duration::from_millis(10)));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_nanos(), 1_000);

        clock.advance(Duration::from_nanos(500));
        assert_eq!(clock.now_nanos(), 1_500);

        clock.set(-42);
        assert_eq!(clock.now_nanos(), -42);
    }

    #[test]
    fn test_manual_clock_saturates() {
        let clock = ManualClock::new(i64::MAX - 1);
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now_nanos(), i64::MAX);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(duration_to_nanos(Duration::from_secs(1)), 1_000_000_000);
        assert_eq!(duration_to_nanos(Duration::MAX), i64::MAX);
        assert_eq!(nanos_to_duration(1_000_000), Duration::from_millis(1));
        assert_eq!(nanos_to_duration(-5), Duration::ZERO);
    }
}
