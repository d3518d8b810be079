//! # rl_core
//!
//! Interchangeable rate limiting algorithms behind one [`RateLimiter`] contract.
//!
//! Every call takes the current instant explicitly (`now`, monotonic nanoseconds) and
//! answers whether `permits` may proceed, and if not, how long to wait before retrying.
//! No limiter reads a clock, sleeps or spawns; [`ClockedLimiter`] adds that on top.
//!
//! - [`FixedWindowCounter`]: `rate` permits per absolute-aligned window
//! - [`SlidingWindowLog`]: timestamp log over a trailing window, counting rejected attempts
//! - [`TokenBucket`]: bursts up to `capacity`, whole-period refills
//! - [`SpacingLeakyBucket`]: permits spaced `rate_interval` apart with a look-ahead burst
//!
//! ```
//! use rl_core::RateLimiter;
//! use rl_core::TokenBucket;
//!
//! let bucket = TokenBucket::new(10, 1, 100_000_000).unwrap();
//! assert!(bucket.try_acquire(0, 10).unwrap().is_acquired());
//!
//! let result = bucket.try_acquire(0, 1).unwrap();
//! assert_eq!(result.retry_after(), 100_000_000);
//! ```

pub mod clocked;
pub mod config;
pub mod error;
pub mod fixed_window;
pub mod limiter;
pub mod saturating;
pub mod sliding_window_log;
pub mod spacing_leaky_bucket;
pub mod time;
pub mod token_bucket;

pub use clocked::ClockedLimiter;
pub use config::LimiterConfig;
pub use error::RateLimitError;
pub use error::Result;
pub use fixed_window::FixedWindowCounter;
pub use fixed_window::FixedWindowCounterBuilder;
pub use limiter::AcquireResult;
pub use limiter::Nanos;
pub use limiter::Permits;
pub use limiter::RateLimiter;
pub use sliding_window_log::SlidingWindowLog;
pub use sliding_window_log::SlidingWindowLogBuilder;
pub use spacing_leaky_bucket::SpacingLeakyBucket;
pub use spacing_leaky_bucket::SpacingLeakyBucketBuilder;
pub use time::Clock;
pub use time::ManualClock;
pub use time::TimeSource;
pub use token_bucket::TokenBucket;
pub use token_bucket::TokenBucketBuilder;
