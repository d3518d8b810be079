//! Burst and steady load runners
//!
//! Both runners read time from a [`Clock`] and the steady runner pauses through a caller-supplied
//! sleep function, so tests drive them with a [`ManualClock`](rl_core::ManualClock) and no real waiting.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rand::Rng;
use rl_core::AcquireResult;
use rl_core::Clock;
use rl_core::Nanos;
use rl_core::Permits;
use rl_core::RateLimiter;
use rl_core::Result;
use rl_core::saturating;
use rl_core::time::duration_to_nanos;
use rl_core::time::nanos_to_duration;

use crate::config_loader::LoadConfig;

const SECOND: Nanos = 1_000_000_000;
const NANOS_PER_MS: f64 = 1_000_000.0;

/// Rejections listed individually in a burst report
pub const FIRST_REJECTIONS_REPORTED: usize = 5;

/// Every this many successes the next attempt is pushed back by a random jitter
const JITTER_EVERY: u64 = 32;
const MAX_JITTER: Nanos = 50_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstReport {
    pub ok: u32,
    pub rejected: u32,
    pub max_retry_after: Nanos,
    pub first_rejections: Vec<Nanos>,
    pub available: Permits,
}

impl BurstReport {
    pub fn log(&self) {
        for (i, retry_after) in self.first_rejections.iter().enumerate() {
            tracing::info!(reject = i + 1, retry_after_ns = retry_after, "burst rejection");
        }
        tracing::info!(ok = self.ok, rejected = self.rejected, available = self.available, "burst finished");
        if self.rejected > 0 {
            tracing::info!(max_retry_after_ns = self.max_retry_after, "burst backoff");
        }
    }
}

/// Fire `attempts` acquisitions of `permits` at a single instant
pub fn run_burst<C: Clock + ?Sized>(limiter: &dyn RateLimiter, clock: &C, attempts: u32, permits: Permits) -> Result<BurstReport> {
    let now = clock.now_nanos();
    let mut report = BurstReport { ok: 0, rejected: 0, max_retry_after: 0, first_rejections: Vec::new(), available: 0 };

    for _ in 0..attempts {
        match limiter.try_acquire(now, permits)? {
            AcquireResult::Acquired { .. } => report.ok += 1,
            AcquireResult::Rejected { retry_after } => {
                report.rejected += 1;
                report.max_retry_after = report.max_retry_after.max(retry_after);
                if report.first_rejections.len() < FIRST_REJECTIONS_REPORTED {
                    report.first_rejections.push(retry_after);
                }
            }
        }
    }

    report.available = limiter.available_tokens(now);
    Ok(report)
}

/// How a steady-load client reacts to a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    /// Waits for the later of the next paced slot and the advertised retry-after
    Polite,
    /// Ignores retry-after and keeps attempting at the target rate
    Hammer,
}

impl ClientMode {
    pub fn from_respect_retry_after(respect: bool) -> Self {
        if respect { ClientMode::Polite } else { ClientMode::Hammer }
    }
}

impl fmt::Display for ClientMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMode::Polite => write!(f, "POLITE"),
            ClientMode::Hammer => write!(f, "HAMMER"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SteadyParams {
    pub qps: u32,
    pub duration: Duration,
    pub mode: ClientMode,
}

impl From<&LoadConfig> for SteadyParams {
    fn from(load: &LoadConfig) -> Self {
        Self { qps: load.qps, duration: Duration::from_secs(load.seconds), mode: ClientMode::from_respect_retry_after(load.respect_retry_after) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteadyReport {
    pub mode: ClientMode,
    pub ok: u64,
    pub rejected: u64,
    pub elapsed: Nanos,
    /// Total time spent waiting for the next paced attempt
    pub pace_sleep: Nanos,
    pub backoff_sum: Nanos,
    pub backoff_max: Nanos,
    /// Rejections where retry-after pushed the next attempt past the paced slot
    pub backoff_wins: u64,
}

impl SteadyReport {
    fn new(mode: ClientMode) -> Self {
        Self { mode, ok: 0, rejected: 0, elapsed: 0, pace_sleep: 0, backoff_sum: 0, backoff_max: 0, backoff_wins: 0 }
    }

    pub fn total(&self) -> u64 {
        self.ok + self.rejected
    }

    fn seconds(&self) -> f64 {
        (self.elapsed as f64 / SECOND as f64).max(1e-9)
    }

    pub fn attempt_qps(&self) -> f64 {
        self.total() as f64 / self.seconds()
    }

    pub fn ok_qps(&self) -> f64 {
        self.ok as f64 / self.seconds()
    }

    pub fn reject_rate_percent(&self) -> f64 {
        100.0 * self.rejected as f64 / self.total().max(1) as f64
    }

    pub fn avg_pace_sleep_ms(&self) -> f64 {
        self.pace_sleep as f64 / NANOS_PER_MS / self.total().max(1) as f64
    }

    /// `None` unless a polite client saw at least one rejection
    pub fn avg_backoff_ms(&self) -> Option<f64> {
        (self.mode == ClientMode::Polite && self.rejected > 0).then(|| self.backoff_sum as f64 / NANOS_PER_MS / self.rejected as f64)
    }

    pub fn log(&self) {
        tracing::info!(mode = %self.mode, total = self.total(), ok = self.ok, rejected = self.rejected, "steady finished");
        tracing::info!(
            attempt_qps = %format!("{:.1}", self.attempt_qps()),
            ok_qps = %format!("{:.1}", self.ok_qps()),
            reject_rate_pct = %format!("{:.1}", self.reject_rate_percent()),
            avg_pace_sleep_ms = self.avg_pace_sleep_ms(),
            "steady throughput"
        );
        if let Some(avg_backoff_ms) = self.avg_backoff_ms() {
            tracing::info!(
                avg_backoff_ms,
                max_backoff_ms = self.backoff_max as f64 / NANOS_PER_MS,
                backoff_wins = %format!("{}/{}", self.backoff_wins, self.rejected),
                "steady backoff"
            );
        }
    }
}

/// Attempt one permit at `params.qps` for `params.duration`, or until `running` is cleared
///
/// Next attempts are scheduled from the later of now and the planned slot, so a late wake-up does
/// not accumulate drift.
pub fn run_steady<C, R, S>(limiter: &dyn RateLimiter, clock: &C, params: &SteadyParams, running: &AtomicBool, rng: &mut R, mut sleep: S) -> Result<SteadyReport>
where
    C: Clock + ?Sized,
    R: Rng,
    S: FnMut(Duration),
{
    let interval = SECOND / Nanos::from(params.qps.max(1));
    let start = clock.now_nanos();
    let deadline = saturating::add(start, duration_to_nanos(params.duration));

    tracing::info!(mode = %params.mode, qps = params.qps, duration = ?params.duration, "steady load starting");

    let mut report = SteadyReport::new(params.mode);
    let mut next_attempt = start;

    while running.load(Ordering::Relaxed) {
        let now = clock.now_nanos();
        if now >= deadline {
            break;
        }

        if now < next_attempt {
            let pause = next_attempt - now;
            report.pace_sleep = saturating::add(report.pace_sleep, pause);
            sleep(nanos_to_duration(pause));
            continue;
        }

        let base = now.max(next_attempt);
        let desired = saturating::add(base, interval);

        match limiter.try_acquire(now, 1)? {
            AcquireResult::Acquired { .. } => {
                report.ok += 1;
                let jitter = if report.ok % JITTER_EVERY == 0 { rng.gen_range(0..MAX_JITTER) } else { 0 };
                next_attempt = saturating::add(desired, jitter);
            }
            AcquireResult::Rejected { retry_after } => {
                report.rejected += 1;
                next_attempt = match params.mode {
                    ClientMode::Polite => {
                        let backoff = saturating::non_negative(retry_after);
                        report.backoff_sum = saturating::add(report.backoff_sum, backoff);
                        report.backoff_max = report.backoff_max.max(backoff);

                        let after_backoff = saturating::add(base, backoff);
                        if after_backoff > desired {
                            report.backoff_wins += 1;
                        }
                        desired.max(after_backoff)
                    }
                    ClientMode::Hammer => desired,
                };
            }
        }
    }

    report.elapsed = saturating::sub(clock.now_nanos(), start);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rl_core::ManualClock;

    use super::*;
    use crate::cli::AlgorithmArg;

    const MS: Nanos = 1_000_000;

    fn steady(algo: AlgorithmArg, mode: ClientMode, qps: u32, seconds: u64) -> SteadyReport {
        let limiter = algo.preset().build().unwrap();
        let clock = ManualClock::new(0);
        let running = AtomicBool::new(true);
        let mut rng = StdRng::seed_from_u64(7);
        let params = SteadyParams { qps, duration: Duration::from_secs(seconds), mode };

        run_steady(limiter.as_ref(), &clock, &params, &running, &mut rng, |pause| clock.advance(pause)).unwrap()
    }

    #[test]
    fn test_burst_token_bucket() {
        let limiter = AlgorithmArg::Token.preset().build().unwrap();
        let clock = ManualClock::new(5 * SECOND);

        let report = run_burst(limiter.as_ref(), &clock, 50, 1).unwrap();

        assert_eq!(report.ok, 10);
        assert_eq!(report.rejected, 40);
        assert_eq!(report.first_rejections, vec![100 * MS; FIRST_REJECTIONS_REPORTED]);
        assert_eq!(report.max_retry_after, 100 * MS);
        assert_eq!(report.available, 0);
    }

    #[test]
    fn test_burst_fixed_window_waits_for_boundary() {
        let limiter = AlgorithmArg::Fixed.preset().build().unwrap();
        let clock = ManualClock::new(2 * SECOND + 250 * MS);

        let report = run_burst(limiter.as_ref(), &clock, 12, 1).unwrap();

        assert_eq!(report.ok, 10);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.first_rejections, vec![750 * MS, 750 * MS]);
    }

    #[test]
    fn test_burst_without_rejections() {
        let limiter = AlgorithmArg::Sliding.preset().build().unwrap();
        let clock = ManualClock::new(0);

        let report = run_burst(limiter.as_ref(), &clock, 4, 2).unwrap();

        assert_eq!(report.ok, 4);
        assert_eq!(report.rejected, 0);
        assert!(report.first_rejections.is_empty());
        assert_eq!(report.available, 2);
    }

    #[test]
    fn test_burst_invalid_permits() {
        let limiter = AlgorithmArg::Spacing.preset().build().unwrap();
        let clock = ManualClock::new(0);

        assert!(run_burst(limiter.as_ref(), &clock, 3, 11).is_err());
    }

    #[test]
    fn test_steady_polite_token_bucket() {
        let report = steady(AlgorithmArg::Token, ClientMode::Polite, 50, 5);

        // Initial burst plus one refill per 100ms
        assert!(report.ok <= 60, "ok={}", report.ok);
        assert!(report.ok >= 40, "ok={}", report.ok);
        assert!(report.rejected > 0);
        assert!(report.backoff_wins > 0);
        assert!(report.backoff_max <= 100 * MS);
        assert!(report.elapsed >= 5 * SECOND);
        assert!(report.avg_backoff_ms().is_some());
    }

    #[test]
    fn test_steady_hammer_ignores_backoff() {
        let report = steady(AlgorithmArg::Token, ClientMode::Hammer, 50, 5);

        assert!(report.total() >= 240 && report.total() <= 250, "total={}", report.total());
        assert!(report.ok <= 60);
        assert_eq!(report.backoff_sum, 0);
        assert_eq!(report.backoff_wins, 0);
        assert_eq!(report.avg_backoff_ms(), None);
    }

    #[test]
    fn test_steady_under_limit_never_rejects() {
        let report = steady(AlgorithmArg::Spacing, ClientMode::Polite, 5, 2);

        assert_eq!(report.rejected, 0);
        assert_eq!(report.ok, 10);
        assert_eq!(report.avg_backoff_ms(), None);
    }

    #[test]
    fn test_steady_stops_when_not_running() {
        let limiter = AlgorithmArg::Fixed.preset().build().unwrap();
        let clock = ManualClock::new(0);
        let running = AtomicBool::new(false);
        let params = SteadyParams { qps: 50, duration: Duration::from_secs(5), mode: ClientMode::Polite };

        let report = run_steady(limiter.as_ref(), &clock, &params, &running, &mut StdRng::seed_from_u64(1), |_| panic!("should not sleep")).unwrap();

        assert_eq!(report.total(), 0);
        assert_eq!(report.elapsed, 0);
    }

    #[test]
    fn test_steady_stops_on_shutdown_signal() {
        let limiter = AlgorithmArg::Fixed.preset().build().unwrap();
        let clock = ManualClock::new(0);
        let running = AtomicBool::new(true);
        let sleeps = Cell::new(0);
        let params = SteadyParams { qps: 10, duration: Duration::from_secs(60), mode: ClientMode::Polite };

        let report = run_steady(limiter.as_ref(), &clock, &params, &running, &mut StdRng::seed_from_u64(1), |pause| {
            sleeps.set(sleeps.get() + 1);
            if sleeps.get() == 3 {
                running.store(false, Ordering::Relaxed);
            }
            clock.advance(pause);
        })
        .unwrap();

        assert_eq!(report.total(), 3);
        assert_eq!(report.elapsed, 300 * MS);
    }

    #[test]
    fn test_report_metrics() {
        let report = SteadyReport {
            mode: ClientMode::Polite,
            ok: 30,
            rejected: 10,
            elapsed: 2 * SECOND,
            pace_sleep: 400 * MS,
            backoff_sum: 50 * MS,
            backoff_max: 20 * MS,
            backoff_wins: 4,
        };

        assert_eq!(report.total(), 40);
        assert!((report.attempt_qps() - 20.0).abs() < 1e-9);
        assert!((report.ok_qps() - 15.0).abs() < 1e-9);
        assert!((report.reject_rate_percent() - 25.0).abs() < 1e-9);
        assert!((report.avg_pace_sleep_ms() - 10.0).abs() < 1e-9);
        assert_eq!(report.avg_backoff_ms(), Some(5.0));
    }

    #[test]
    fn test_params_from_load_config() {
        let load = LoadConfig { qps: 20, seconds: 3, burst_attempts: 5, respect_retry_after: false };
        let params = SteadyParams::from(&load);

        assert_eq!(params, SteadyParams { qps: 20, duration: Duration::from_secs(3), mode: ClientMode::Hammer });
        assert_eq!(params.mode.to_string(), "HAMMER");
    }
}
