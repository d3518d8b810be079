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

/// Fixed window rate limiter with hard resets at window boundaries
///
/// Time is cut into windows of `window_size` nanoseconds aligned to absolute time
/// (`floor(now / window_size)`). Each window admits at most `rate` permits; the allowance
/// refills in full the first time a call lands in a later window.
pub struct FixedWindowCounter {
    /// Maximum permits allowed per window
    rate: Permits,

    /// Window duration in nanoseconds
    window_size: Nanos,

    state: Mutex<FixedWindowState>,
}

struct FixedWindowState {
    /// Start of the window last observed, unset until the first call
    window_start: Option<Nanos>,

    /// Permits still grantable in that window
    remaining: Permits,
}

impl FixedWindowState {
    /// Move to the window containing `now` if it is newer than the stored one
    ///
    /// A `now` at or before the stored window start is charged to the stored window, so a
    /// clock stepping backwards never rolls the counter back.
    #[inline(always)]
    fn roll(&mut self, now: Nanos, rate: Permits, window_size: Nanos) {
        let current = saturating::window_start(now, window_size);
        match self.window_start {
            Some(start) if now <= start || current <= start => {}
            _ => {
                self.window_start = Some(current);
                self.remaining = rate;
            }
        }
    }

    #[inline(always)]
    fn retry_after(&self, now: Nanos, permits: Permits, window_size: Nanos) -> Nanos {
        if self.remaining >= permits {
            return 0;
        }
        let Some(start) = self.window_start else {
            return 0;
        };
        let next_window_start = saturating::add(start, window_size);
        saturating::non_negative(saturating::sub(next_window_start, now))
    }
}

impl FixedWindowCounter {
    /// Create a new fixed window rate limiter
    pub fn new(rate: Permits, window_size: Nanos) -> Result<Self> {
        ensure_positive(rate, "rate must be positive")?;
        ensure_positive(window_size, "window size must be positive")?;

        tracing::debug!(rate, window_size, "fixed window counter created");

        Ok(Self { rate, window_size, state: Mutex::new(FixedWindowState { window_start: None, remaining: rate }) })
    }

    /// Create a fixed window limiter with per-second limit
    pub fn per_second(rate: Permits) -> Result<Self> {
        Self::builder().per_second(rate).build()
    }

    /// Create a fixed window limiter with per-minute limit
    pub fn per_minute(rate: Permits) -> Result<Self> {
        Self::builder().per_minute(rate).build()
    }

    /// Create a builder for configuring a fixed window limiter
    pub fn builder() -> FixedWindowCounterBuilder {
        FixedWindowCounterBuilder::new()
    }

    pub fn window_size(&self) -> Nanos {
        self.window_size
    }
}

impl RateLimiter for FixedWindowCounter {
    #[inline]
    fn try_acquire(&self, now: Nanos, permits: Permits) -> Result<AcquireResult> {
        validate_permits(permits, self.rate)?;

        let mut state = self.state.lock();
        state.roll(now, self.rate, self.window_size);

        if state.remaining >= permits {
            state.remaining -= permits;
            return Ok(AcquireResult::Acquired { granted_permits: permits });
        }

        let retry_after = state.retry_after(now, permits, self.window_size);
        tracing::trace!(now, permits, remaining = state.remaining, retry_after, "fixed window rejected");
        Ok(AcquireResult::Rejected { retry_after })
    }

    fn available_tokens(&self, now: Nanos) -> Permits {
        let mut state = self.state.lock();
        state.roll(now, self.rate, self.window_size);
        state.remaining
    }

    fn retry_after(&self, now: Nanos, permits: Permits) -> Result<Nanos> {
        validate_permits(permits, self.rate)?;

        let mut state = self.state.lock();
        state.roll(now, self.rate, self.window_size);
        Ok(state.retry_after(now, permits, self.window_size))
    }

    fn capacity(&self) -> Permits {
        self.rate
    }
}

/// Builder for configuring a fixed window rate limiter
#[derive(Debug, Default)]
pub struct FixedWindowCounterBuilder {
    rate: Option<Permits>,
    window: Option<Duration>,
}

impl FixedWindowCounterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self { rate: None, window: None }
    }

    /// Set the rate (max permits per window)
    pub fn rate(mut self, rate: Permits) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Set the window duration
    pub fn window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Set window to 1 second
    pub fn per_second(self, rate: Permits) -> Self {
        self.rate(rate).window(Duration::from_secs(1))
    }

    /// Set window to 1 minute
    pub fn per_minute(self, rate: Permits) -> Self {
        self.rate(rate).window(Duration::from_secs(60))
    }

    /// Build the fixed window limiter
    pub fn build(self) -> Result<FixedWindowCounter> {
        let rate = self.rate.ok_or(RateLimitError::InvalidConstruction("rate must be set"))?;
        let window = self.window.ok_or(RateLimitError::InvalidConstruction("window must be set"))?;
        FixedWindowCounter::new(rate, duration_to_nanos(window))
    }
}
