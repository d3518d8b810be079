//! Declarative limiter configuration
//!
//! Lets callers pick an algorithm and its parameters from a config file or CLI preset and
//! get back a boxed [`RateLimiter`]. Durations are human-readable (`"100ms"`, `"1s"`).

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::fixed_window::FixedWindowCounter;
use crate::limiter::Permits;
use crate::limiter::RateLimiter;
use crate::sliding_window_log::SlidingWindowLog;
use crate::spacing_leaky_bucket::SpacingLeakyBucket;
use crate::token_bucket::TokenBucket;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterConfig {
    FixedWindow {
        rate: Permits,
        #[serde(with = "humantime_serde")]
        window: Duration,
    },
    SlidingWindowLog {
        rate: Permits,
        #[serde(with = "humantime_serde")]
        window: Duration,
    },
    TokenBucket {
        capacity: Permits,
        refill_tokens: Permits,
        #[serde(with = "humantime_serde")]
        refill_period: Duration,
    },
    SpacingLeakyBucket {
        max_burst: Permits,
        #[serde(with = "humantime_serde")]
        rate_interval: Duration,
    },
}

impl LimiterConfig {
    /// Stable algorithm name, matching the serde tag
    pub fn algorithm(&self) -> &'static str {
        match self {
            LimiterConfig::FixedWindow { .. } => "fixed_window",
            LimiterConfig::SlidingWindowLog { .. } => "sliding_window_log",
            LimiterConfig::TokenBucket { .. } => "token_bucket",
            LimiterConfig::SpacingLeakyBucket { .. } => "spacing_leaky_bucket",
        }
    }

    /// Construct a fresh limiter from this configuration
    pub fn build(&self) -> Result<Box<dyn RateLimiter>> {
        let limiter: Box<dyn RateLimiter> = match *self {
            LimiterConfig::FixedWindow { rate, window } => Box::new(FixedWindowCounter::builder().rate(rate).window(window).build()?),
            LimiterConfig::SlidingWindowLog { rate, window } => Box::new(SlidingWindowLog::builder().rate(rate).window(window).build()?),
            LimiterConfig::TokenBucket { capacity, refill_tokens, refill_period } => {
                Box::new(TokenBucket::builder().capacity(capacity).refill(refill_tokens, refill_period).build()?)
            }
            LimiterConfig::SpacingLeakyBucket { max_burst, rate_interval } => {
                Box::new(SpacingLeakyBucket::builder().max_burst(max_burst).rate_interval(rate_interval).build()?)
            }
        };
        Ok(limiter)
    }
}
