use std::time::Duration;

use crate::error::RateLimitError;
use crate::error::Result;
use crate::time::nanos_to_duration;

/// Signed nanosecond timestamp or duration
pub type Nanos = i64;

/// Count of abstract resource units
pub type Permits = i64;

/// Outcome of a single admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// The requested permits were consumed
    Acquired { granted_permits: Permits },

    /// Not enough capacity at the supplied instant
    ///
    /// `retry_after` is the minimal delay (ns, always >= 0) after which repeating the same
    /// request may succeed. It is advisory: other callers may take the capacity first.
    Rejected { retry_after: Nanos },
}

impl AcquireResult {
    #[inline(always)]
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireResult::Acquired { .. })
    }

    /// Delay before a retry may succeed, 0 when acquired
    #[inline(always)]
    pub fn retry_after(&self) -> Nanos {
        match self {
            AcquireResult::Acquired { .. } => 0,
            AcquireResult::Rejected { retry_after } => *retry_after,
        }
    }

    pub fn retry_after_duration(&self) -> Duration {
        nanos_to_duration(self.retry_after())
    }
}

/// Contract shared by every rate limiting algorithm
///
/// All operations take the current instant explicitly as monotonic nanoseconds, so every
/// call is deterministic given the previous calls. Each implementation serialises its
/// operations behind a single lock per instance.
pub trait RateLimiter: Send + Sync {
    /// Try to consume `permits` at `now` without blocking
    ///
    /// Fails with [`RateLimitError::InvalidArgument`] (and no side effect) if `permits` is
    /// not positive or exceeds [`capacity`](RateLimiter::capacity).
    fn try_acquire(&self, now: Nanos, permits: Permits) -> Result<AcquireResult>;

    /// Spare capacity at `now`, in `[0, capacity]`
    ///
    /// Never admits anything, but may normalise internal state (advance a window, prune a
    /// log, refill a bucket).
    fn available_tokens(&self, now: Nanos) -> Permits;

    /// The delay `try_acquire(now, permits)` would report if rejected, 0 if it would succeed
    fn retry_after(&self, now: Nanos, permits: Permits) -> Result<Nanos>;

    /// Structural capacity: the largest request that can ever be granted
    fn capacity(&self) -> Permits;

    /// Try to consume a single permit
    fn try_acquire_one(&self, now: Nanos) -> Result<AcquireResult> {
        self.try_acquire(now, 1)
    }
}

impl<L: RateLimiter + ?Sized> RateLimiter for Box<L> {
    fn try_acquire(&self, now: Nanos, permits: Permits) -> Result<AcquireResult> {
        (**self).try_acquire(now, permits)
    }

    fn available_tokens(&self, now: Nanos) -> Permits {
        (**self).available_tokens(now)
    }

    fn retry_after(&self, now: Nanos, permits: Permits) -> Result<Nanos> {
        (**self).retry_after(now, permits)
    }

    fn capacity(&self) -> Permits {
        (**self).capacity()
    }
}

/// Reject non-positive requests and requests that can never fit
#[inline(always)]
pub(crate) fn validate_permits(permits: Permits, capacity: Permits) -> Result<()> {
    if permits <= 0 {
        return Err(RateLimitError::InvalidArgument("permits must be positive"));
    }
    if permits > capacity {
        return Err(RateLimitError::InvalidArgument("permits exceed limiter capacity"));
    }
    Ok(())
}

/// Construction-time check for rates, capacities and intervals
#[inline(always)]
pub(crate) fn ensure_positive(value: i64, message: &'static str) -> Result<()> {
    if value <= 0 {
        return Err(RateLimitError::InvalidConstruction(message));
    }
    Ok(())
}
