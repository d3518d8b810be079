use std::collections::VecDeque;
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

/// Sliding window rate limiter keeping a timestamp for every permit unit
///
/// Every call first drops log entries older than `now - window_size`, then logs `permits`
/// copies of `now` *whether or not* the request is admitted, and admits iff the log holds
/// at most `rate` entries. Rejected attempts therefore keep occupying the window until they
/// age out, which makes callers that hammer through rejections wait longer.
///
/// An entry stamped `t` still counts at `t + window_size` and is gone at
/// `t + window_size + 1`.
pub struct SlidingWindowLog {
    /// Maximum permits logged per window
    rate: Permits,

    /// Window duration in nanoseconds
    window_size: Nanos,

    state: Mutex<PermitLog>,
}

/// Count of logged entries, wide enough that summing `Permits` never clamps
type EntryCount = i128;

/// Run-length encoded log: runs of identical timestamps in insertion order
///
/// Insertion order is oldest first while `now` only moves forward. A `now` that goes backwards
/// appends an earlier timestamp behind later ones, and pruning still pops from the front.
#[derive(Debug, Default)]
struct PermitLog {
    runs: VecDeque<(Nanos, EntryCount)>,

    /// Total number of entries across all runs
    len: EntryCount,
}

impl PermitLog {
    #[inline(always)]
    fn newest(&self) -> Option<Nanos> {
        self.runs.back().map(|&(timestamp, _)| timestamp)
    }

    /// Drop front entries older than `now - window_size`
    ///
    /// A `now` earlier than the newest entry is ignored: pruning never moves backwards.
    fn prune(&mut self, now: Nanos, window_size: Nanos) {
        match self.newest() {
            Some(newest) if now >= newest => {}
            _ => return,
        }

        let cutoff = saturating::sub(now, window_size);
        while let Some(&(timestamp, count)) = self.runs.front() {
            if timestamp >= cutoff {
                break;
            }
            self.len -= count;
            self.runs.pop_front();
        }
    }

    fn append(&mut self, now: Nanos, permits: Permits) {
        let permits = EntryCount::from(permits);
        self.len = self.len.saturating_add(permits);
        match self.runs.back_mut() {
            Some((timestamp, count)) if *timestamp == now => *count = count.saturating_add(permits),
            _ => self.runs.push_back((now, permits)),
        }
    }

    /// Latest timestamp among the `n` front entries (`n >= 1`)
    ///
    /// Front pruning drops all of them only once this one has expired.
    fn latest_of_front(&self, n: EntryCount) -> Option<Nanos> {
        let mut seen: EntryCount = 0;
        let mut latest: Option<Nanos> = None;
        for &(timestamp, count) in &self.runs {
            seen = seen.saturating_add(count);
            latest = Some(latest.map_or(timestamp, |l| l.max(timestamp)));
            if seen >= n {
                return latest;
            }
        }
        None
    }

    fn available(&self, rate: Permits) -> EntryCount {
        EntryCount::from(rate) - self.len
    }

    fn retry_after(&self, now: Nanos, permits: Permits, rate: Permits, window_size: Nanos) -> Nanos {
        let available = self.available(rate);
        if available >= EntryCount::from(permits) {
            return 0;
        }

        // The `deficit` front entries have to leave the window before `permits` fit
        let deficit = EntryCount::from(permits).saturating_sub(available);
        let leaving = self.latest_of_front(deficit).unwrap_or(now);
        let expires_at = saturating::add(saturating::add(leaving, window_size), 1);
        saturating::non_negative(saturating::sub(expires_at, now))
    }
}

impl SlidingWindowLog {
    /// Create a new sliding window log limiter
    pub fn new(rate: Permits, window_size: Nanos) -> Result<Self> {
        ensure_positive(rate, "rate must be positive")?;
        ensure_positive(window_size, "window size must be positive")?;

        tracing::debug!(rate, window_size, "sliding window log created");

        Ok(Self { rate, window_size, state: Mutex::new(PermitLog::default()) })
    }

    /// Create a builder for configuring a sliding window log
    pub fn builder() -> SlidingWindowLogBuilder {
        SlidingWindowLogBuilder::new()
    }

    pub fn window_size(&self) -> Nanos {
        self.window_size
    }

    /// Number of entries currently held, including rejected attempts
    pub fn log_len(&self) -> Permits {
        Permits::try_from(self.state.lock().len).unwrap_or(Permits::MAX)
    }
}

impl RateLimiter for SlidingWindowLog {
    fn try_acquire(&self, now: Nanos, permits: Permits) -> Result<AcquireResult> {
        validate_permits(permits, self.rate)?;

        let mut log = self.state.lock();
        log.prune(now, self.window_size);
        log.append(now, permits);

        if log.len <= EntryCount::from(self.rate) {
            return Ok(AcquireResult::Acquired { granted_permits: permits });
        }

        let retry_after = log.retry_after(now, permits, self.rate, self.window_size);
        tracing::trace!(now, permits, logged = %log.len, retry_after, "sliding window log rejected");
        Ok(AcquireResult::Rejected { retry_after })
    }

    fn available_tokens(&self, now: Nanos) -> Permits {
        let mut log = self.state.lock();
        log.prune(now, self.window_size);
        // Bounded by `rate`, so the narrowing is lossless
        log.available(self.rate).clamp(0, EntryCount::from(self.rate)) as Permits
    }

    fn retry_after(&self, now: Nanos, permits: Permits) -> Result<Nanos> {
        validate_permits(permits, self.rate)?;

        let mut log = self.state.lock();
        log.prune(now, self.window_size);
        Ok(log.retry_after(now, permits, self.rate, self.window_size))
    }

    fn capacity(&self) -> Permits {
        self.rate
    }
}

/// Builder for configuring a sliding window log
#[derive(Debug, Default)]
pub struct SlidingWindowLogBuilder {
    rate: Option<Permits>,
    window: Option<Duration>,
}

impl SlidingWindowLogBuilder {
    pub fn new() -> Self {
        Self { rate: None, window: None }
    }

    /// Set the rate (max permits per window)
    pub fn rate(mut self, rate: Permits) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Set window to 1 second
    pub fn per_second(self, rate: Permits) -> Self {
        self.rate(rate).window(Duration::from_secs(1))
    }

    pub fn build(self) -> Result<SlidingWindowLog> {
        let rate = self.rate.ok_or(RateLimitError::InvalidConstruction("rate must be set"))?;
        let window = self.window.ok_or(RateLimitError::InvalidConstruction("window must be set"))?;
        SlidingWindowLog::new(rate, duration_to_nanos(window))
    }
}
