use std::time::Duration;

use parking_lot::Mutex;

use crate::error::RateLimitError;
use crate::error::Result;
use crate::limiter::AcquireResult;
use crate::limiter::Nanos;
use crate::limiter::Permits;
use crate::limiter::RateLimiter;
use crate::limiter::ensure_positive;
use crate::limiter::validate_permits;
use crate::saturating;
use crate::time::duration_to_nanos;

/// Leaky bucket that spaces permits `rate_interval` apart
///
/// Every permit books `rate_interval` nanoseconds of service time on a schedule that drains
/// at wall speed. `next_free_time` is the instant the schedule is caught up. A request is
/// admitted as long as its booking ends within `now + max_burst * rate_interval`, so up to
/// `max_burst` permits can be taken at once and the steady rate is one per interval.
pub struct SpacingLeakyBucket {
    /// Largest look-ahead, in permits
    max_burst: Permits,

    /// Service time of one permit in nanoseconds
    rate_interval: Nanos,

    /// `max_burst * rate_interval`, pre-computed
    burst_window: Nanos,

    /// Instant the schedule is caught up, unset until the first admission
    next_free_time: Mutex<Option<Nanos>>,
}

impl SpacingLeakyBucket {
    /// Create a new spacing leaky bucket
    pub fn new(max_burst: Permits, rate_interval: Nanos) -> Result<Self> {
        ensure_positive(max_burst, "max burst must be positive")?;
        ensure_positive(rate_interval, "rate interval must be positive")?;

        tracing::debug!(max_burst, rate_interval, "spacing leaky bucket created");

        Ok(Self { max_burst, rate_interval, burst_window: saturating::mul(max_burst, rate_interval), next_free_time: Mutex::new(None) })
    }

    /// Create a builder for configuring a spacing leaky bucket
    pub fn builder() -> SpacingLeakyBucketBuilder {
        SpacingLeakyBucketBuilder::new()
    }

    pub fn rate_interval(&self) -> Nanos {
        self.rate_interval
    }

    /// Wait until the burst slack can hold `permits` more
    #[inline(always)]
    fn retry_after_locked(&self, next_free_time: Option<Nanos>, now: Nanos, permits: Permits) -> Nanos {
        let Some(next_free) = next_free_time else {
            return 0;
        };
        let burst_slack = saturating::mul(self.max_burst - permits, self.rate_interval);
        let threshold = saturating::sub(next_free, burst_slack);
        saturating::non_negative(saturating::sub(threshold, now))
    }
}

impl RateLimiter for SpacingLeakyBucket {
    #[inline]
    fn try_acquire(&self, now: Nanos, permits: Permits) -> Result<AcquireResult> {
        validate_permits(permits, self.max_burst)?;

        let mut next_free_time = self.next_free_time.lock();

        let effective_free = next_free_time.map_or(now, |next_free| next_free.max(now));
        let candidate = saturating::add(effective_free, saturating::mul(permits, self.rate_interval));
        let ceiling = saturating::add(now, self.burst_window);

        if candidate > ceiling {
            let retry_after = self.retry_after_locked(*next_free_time, now, permits);
            tracing::trace!(now, permits, candidate, ceiling, retry_after, "spacing leaky bucket rejected");
            return Ok(AcquireResult::Rejected { retry_after });
        }

        *next_free_time = Some(candidate);
        Ok(AcquireResult::Acquired { granted_permits: permits })
    }

    fn available_tokens(&self, now: Nanos) -> Permits {
        let Some(next_free) = *self.next_free_time.lock() else {
            return self.max_burst;
        };

        let slack = saturating::sub(saturating::add(now, self.burst_window), next_free);
        if slack <= 0 {
            return 0;
        }
        (slack / self.rate_interval).min(self.max_burst)
    }

    fn retry_after(&self, now: Nanos, permits: Permits) -> Result<Nanos> {
        validate_permits(permits, self.max_burst)?;

        let next_free_time = self.next_free_time.lock();
        Ok(self.retry_after_locked(*next_free_time, now, permits))
    }

    fn capacity(&self) -> Permits {
        self.max_burst
    }
}

/// Builder for configuring a spacing leaky bucket
#[derive(Debug, Default)]
pub struct SpacingLeakyBucketBuilder {
    max_burst: Option<Permits>,
    rate_interval: Option<Duration>,
}

impl SpacingLeakyBucketBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self { max_burst: None, rate_interval: None }
    }

    /// Set the burst allowance (max permits at once)
    pub fn max_burst(mut self, max_burst: Permits) -> Self {
        self.max_burst = Some(max_burst);
        self
    }

    /// Set the spacing between permits
    pub fn rate_interval(mut self, interval: Duration) -> Self {
        self.rate_interval = Some(interval);
        self
    }

    /// Space permits to `rate` per second
    pub fn rate_per_second(self, rate: u32) -> Self {
        self.rate_interval(Duration::from_secs(1) / rate.max(1))
    }

    /// Build the spacing leaky bucket
    pub fn build(self) -> Result<SpacingLeakyBucket> {
        let max_burst = self.max_burst.ok_or(RateLimitError::InvalidConstruction("max burst must be set"))?;
        let rate_interval = self.rate_interval.ok_or(RateLimitError::InvalidConstruction("rate interval must be set"))?;
        SpacingLeakyBucket::new(max_burst, duration_to_nanos(rate_interval))
    }
}
