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

/// Token bucket rate limiter with whole-period refills
///
/// The bucket starts full. Every `refill_period` nanoseconds `refill_tokens` tokens are
/// added, capped at `capacity`. Partial periods are never credited, and the refill clock
/// advances by exactly the whole periods consumed, so refills do not drift with call
/// timing. Requests consume tokens and allow bursts up to `capacity`.
pub struct TokenBucket {
    /// Maximum number of tokens
    capacity: Permits,

    /// Tokens credited per elapsed period
    refill_tokens: Permits,

    /// Period length in nanoseconds
    refill_period: Nanos,

    state: Mutex<TokenBucketState>,
}

struct TokenBucketState {
    available: Permits,

    /// Instant the last credited period ended, unset until the first call
    last_refill: Option<Nanos>,
}

impl TokenBucketState {
    /// Credit every whole period elapsed since the last refill
    ///
    /// The first call only anchors the refill clock. A `now` at or before the anchor is a
    /// no-op.
    #[inline(always)]
    fn refill(&mut self, now: Nanos, bucket: &TokenBucket) {
        let Some(last) = self.last_refill else {
            self.last_refill = Some(now);
            return;
        };
        if now <= last {
            return;
        }

        let elapsed = saturating::sub(now, last);
        let periods = elapsed / bucket.refill_period;
        if periods == 0 {
            return;
        }

        self.last_refill = Some(saturating::add(last, saturating::mul(periods, bucket.refill_period)));

        let tokens = saturating::mul(periods, bucket.refill_tokens);
        self.available = saturating::add(self.available, tokens).min(bucket.capacity);
    }

    #[inline(always)]
    fn retry_after(&self, now: Nanos, permits: Permits, bucket: &TokenBucket) -> Nanos {
        let missing = saturating::sub(permits, self.available);
        if missing <= 0 {
            return 0;
        }
        let Some(last) = self.last_refill else {
            return 0;
        };

        let periods_needed = saturating::div_ceil(missing, bucket.refill_tokens);
        let ready_at = saturating::add(last, saturating::mul(periods_needed, bucket.refill_period));
        saturating::non_negative(saturating::sub(ready_at, now))
    }
}

impl TokenBucket {
    /// Create a new token bucket
    ///
    /// `refill_tokens` may not exceed `capacity`.
    pub fn new(capacity: Permits, refill_tokens: Permits, refill_period: Nanos) -> Result<Self> {
        ensure_positive(capacity, "capacity must be positive")?;
        ensure_positive(refill_tokens, "refill tokens must be positive")?;
        ensure_positive(refill_period, "refill period must be positive")?;
        if refill_tokens > capacity {
            return Err(RateLimitError::InvalidConstruction("refill tokens cannot exceed capacity"));
        }

        tracing::debug!(capacity, refill_tokens, refill_period, "token bucket created");

        Ok(Self { capacity, refill_tokens, refill_period, state: Mutex::new(TokenBucketState { available: capacity, last_refill: None }) })
    }

    /// Create a builder for configuring a token bucket
    pub fn builder() -> TokenBucketBuilder {
        TokenBucketBuilder::new()
    }

    pub fn refill_tokens(&self) -> Permits {
        self.refill_tokens
    }

    pub fn refill_period(&self) -> Nanos {
        self.refill_period
    }
}

impl RateLimiter for TokenBucket {
    #[inline]
    fn try_acquire(&self, now: Nanos, permits: Permits) -> Result<AcquireResult> {
        validate_permits(permits, self.capacity)?;

        let mut state = self.state.lock();
        state.refill(now, self);

        if state.available >= permits {
            state.available -= permits;
            return Ok(AcquireResult::Acquired { granted_permits: permits });
        }

        let retry_after = state.retry_after(now, permits, self);
        tracing::trace!(now, permits, available = state.available, retry_after, "token bucket rejected");
        Ok(AcquireResult::Rejected { retry_after })
    }

    fn available_tokens(&self, now: Nanos) -> Permits {
        let mut state = self.state.lock();
        state.refill(now, self);
        state.available
    }

    fn retry_after(&self, now: Nanos, permits: Permits) -> Result<Nanos> {
        validate_permits(permits, self.capacity)?;

        let mut state = self.state.lock();
        state.refill(now, self);
        Ok(state.retry_after(now, permits, self))
    }

    fn capacity(&self) -> Permits {
        self.capacity
    }
}

/// Builder for configuring a token bucket
#[derive(Debug, Default)]
pub struct TokenBucketBuilder {
    capacity: Option<Permits>,
    refill_tokens: Option<Permits>,
    refill_period: Option<Duration>,
}

impl TokenBucketBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self { capacity: None, refill_tokens: None, refill_period: None }
    }

    /// Set the bucket capacity (max tokens)
    pub fn capacity(mut self, capacity: Permits) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Credit `tokens` every `period`
    pub fn refill(mut self, tokens: Permits, period: Duration) -> Self {
        self.refill_tokens = Some(tokens);
        self.refill_period = Some(period);
        self
    }

    /// Credit `tokens` once per second
    pub fn refill_per_second(self, tokens: Permits) -> Self {
        self.refill(tokens, Duration::from_secs(1))
    }

    /// Build the token bucket
    pub fn build(self) -> Result<TokenBucket> {
        let capacity = self.capacity.ok_or(RateLimitError::InvalidConstruction("capacity must be set"))?;
        let refill_tokens = self.refill_tokens.ok_or(RateLimitError::InvalidConstruction("refill must be set"))?;
        let refill_period = self.refill_period.ok_or(RateLimitError::InvalidConstruction("refill must be set"))?;
        TokenBucket::new(capacity, refill_tokens, duration_to_nanos(refill_period))
    }
}
