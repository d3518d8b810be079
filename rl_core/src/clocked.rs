use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::limiter::AcquireResult;
use crate::limiter::Permits;
use crate::limiter::RateLimiter;
use crate::time::Clock;
use crate::time::TimeSource;
use crate::time::nanos_to_duration;

/// Shortest pause between attempts in [`ClockedLimiter::acquire`]
const MIN_BACKOFF: Duration = Duration::from_micros(1);

/// A limiter paired with the clock that supplies `now`
///
/// The limiters themselves never read time. This wrapper does it for callers that just want
/// "may I go now?", and adds an async [`acquire`](ClockedLimiter::acquire) that sleeps for
/// the advertised retry delay until admitted.
pub struct ClockedLimiter<C: Clock = TimeSource> {
    limiter: Arc<dyn RateLimiter>,
    clock: C,
}

impl ClockedLimiter<TimeSource> {
    /// Wrap `limiter` with a monotonic clock starting now
    pub fn new<L: RateLimiter + 'static>(limiter: L) -> Self {
        Self::with_clock(limiter, TimeSource::new())
    }
}

impl<C: Clock> ClockedLimiter<C> {
    pub fn with_clock<L: RateLimiter + 'static>(limiter: L, clock: C) -> Self {
        Self { limiter: Arc::new(limiter), clock }
    }

    /// Wrap an already shared limiter
    pub fn from_arc(limiter: Arc<dyn RateLimiter>, clock: C) -> Self {
        Self { limiter, clock }
    }

    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[inline]
    pub fn try_acquire(&self, permits: Permits) -> Result<AcquireResult> {
        self.limiter.try_acquire(self.clock.now_nanos(), permits)
    }

    pub fn available_tokens(&self) -> Permits {
        self.limiter.available_tokens(self.clock.now_nanos())
    }

    pub fn retry_after(&self, permits: Permits) -> Result<Duration> {
        self.limiter.retry_after(self.clock.now_nanos(), permits).map(nanos_to_duration)
    }

    /// Wait until `permits` are granted, returning the total time spent sleeping
    ///
    /// Invalid arguments fail immediately. The limiter lock is never held across a sleep.
    pub async fn acquire(&self, permits: Permits) -> Result<Duration> {
        let mut waited = Duration::ZERO;

        loop {
            match self.try_acquire(permits)? {
                AcquireResult::Acquired { .. } => return Ok(waited),
                AcquireResult::Rejected { retry_after } => {
                    let delay = nanos_to_duration(retry_after).max(MIN_BACKOFF);
                    tracing::trace!(permits, ?delay, "waiting for rate limiter");
                    tokio::time::sleep(delay).await;
                    waited += delay;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedWindowCounter;
    use crate::TokenBucket;
    use crate::error::RateLimitError;
    use crate::time::ManualClock;

    #[test]
    fn test_reads_supplied_clock() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = ClockedLimiter::with_clock(TokenBucket::new(2, 1, 100).unwrap(), Arc::clone(&clock));

        assert!(limiter.try_acquire(2).unwrap().is_acquired());
        assert_eq!(limiter.available_tokens(), 0);
        assert_eq!(limiter.retry_after(1).unwrap(), Duration::from_nanos(100));

        clock.advance(Duration::from_nanos(100));
        assert_eq!(limiter.available_tokens(), 1);
        assert!(limiter.try_acquire(1).unwrap().is_acquired());
    }

    #[test]
    fn test_from_arc_shares_state() {
        let shared: Arc<dyn RateLimiter> = Arc::new(FixedWindowCounter::new(3, 1_000).unwrap());
        let a = ClockedLimiter::from_arc(Arc::clone(&shared), ManualClock::new(10));
        let b = ClockedLimiter::from_arc(shared, ManualClock::new(20));

        assert!(a.try_acquire(2).unwrap().is_acquired());
        assert_eq!(b.available_tokens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = ClockedLimiter::new(TokenBucket::builder().capacity(2).refill(1, Duration::from_millis(100)).build().unwrap());

        assert_eq!(limiter.acquire(2).await.unwrap(), Duration::ZERO);

        let start = tokio::time::Instant::now();
        let waited = limiter.acquire(1).await.unwrap();

        assert_eq!(waited, Duration::from_millis(100));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_next_window() {
        let limiter = ClockedLimiter::new(FixedWindowCounter::builder().rate(5).window(Duration::from_millis(50)).build().unwrap());

        assert!(limiter.try_acquire(5).unwrap().is_acquired());

        let result = tokio::time::timeout(Duration::from_millis(100), limiter.acquire(1)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_rejects_invalid_permits() {
        let limiter = ClockedLimiter::new(TokenBucket::new(2, 1, 100).unwrap());

        assert!(matches!(limiter.acquire(0).await, Err(RateLimitError::InvalidArgument(_))));
        assert!(matches!(limiter.acquire(3).await, Err(RateLimitError::InvalidArgument(_))));
    }
}
