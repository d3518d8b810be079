use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::ValueEnum;
use rl_core::LimiterConfig;

use crate::config_loader::DemoConfigFile;
use crate::config_loader::LoadConfig;

/// Algorithm presets, all sized for about 10 permits per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmArg {
    Fixed,
    Token,
    Spacing,
    Sliding,
}

impl AlgorithmArg {
    pub fn preset(self) -> LimiterConfig {
        match self {
            AlgorithmArg::Fixed => LimiterConfig::FixedWindow { rate: 10, window: Duration::from_secs(1) },
            AlgorithmArg::Token => LimiterConfig::TokenBucket { capacity: 10, refill_tokens: 1, refill_period: Duration::from_millis(100) },
            AlgorithmArg::Spacing => LimiterConfig::SpacingLeakyBucket { max_burst: 10, rate_interval: Duration::from_millis(100) },
            AlgorithmArg::Sliding => LimiterConfig::SlidingWindowLog { rate: 10, window: Duration::from_secs(1) },
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "rl_demo", about = "Drive a rate limiter with a burst and then steady load")]
pub struct DemoArgs {
    /// Limiter preset, ignored when --config is given
    #[arg(long, value_enum, default_value_t = AlgorithmArg::Token)]
    pub algo: AlgorithmArg,

    /// Ignore retry-after and keep attempting at the target rate
    #[arg(long, alias = "ignore-retry-after")]
    pub hammer: bool,

    /// TOML file with [limiter] and [load] sections
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub qps: Option<u32>,

    #[arg(long)]
    pub seconds: Option<u64>,

    /// Attempts fired at one instant in the burst demo
    #[arg(long)]
    pub burst: Option<u32>,

    /// Also write logs to an hourly file in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl DemoArgs {
    /// Merge flags over the loaded config file, or over the preset when there is none
    pub fn resolve(&self, file: Option<DemoConfigFile>) -> DemoConfigFile {
        let (limiter, mut load) = match file {
            Some(file) => (file.limiter, file.load),
            None => (self.algo.preset(), LoadConfig::default()),
        };

        if let Some(qps) = self.qps {
            load.qps = qps;
        }
        if let Some(seconds) = self.seconds {
            load.seconds = seconds;
        }
        if let Some(burst) = self.burst {
            load.burst_attempts = burst;
        }
        if self.hammer {
            load.respect_retry_after = false;
        }

        DemoConfigFile { limiter, load }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = DemoArgs::try_parse_from(["rl_demo"]).unwrap();

        assert_eq!(args.algo, AlgorithmArg::Token);
        assert!(!args.hammer);
        assert!(args.config.is_none());

        let resolved = args.resolve(None);
        assert_eq!(resolved.limiter, AlgorithmArg::Token.preset());
        assert_eq!(resolved.load, LoadConfig::default());
    }

    #[test]
    fn test_algo_and_hammer_flags() {
        let args = DemoArgs::try_parse_from(["rl_demo", "--algo=sliding", "--ignore-retry-after"]).unwrap();
        assert_eq!(args.algo, AlgorithmArg::Sliding);
        assert!(args.hammer);

        let args = DemoArgs::try_parse_from(["rl_demo", "--algo", "spacing", "--hammer"]).unwrap();
        assert_eq!(args.algo, AlgorithmArg::Spacing);
        assert!(!args.resolve(None).load.respect_retry_after);
    }

    #[test]
    fn test_unknown_algo_rejected() {
        assert!(DemoArgs::try_parse_from(["rl_demo", "--algo=gcra"]).is_err());
    }

    #[test]
    fn test_presets_build() {
        for algo in [AlgorithmArg::Fixed, AlgorithmArg::Token, AlgorithmArg::Spacing, AlgorithmArg::Sliding] {
            let limiter = algo.preset().build().unwrap();
            assert_eq!(limiter.capacity(), 10);
        }
    }

    #[test]
    fn test_flags_override_file() {
        let args = DemoArgs::try_parse_from(["rl_demo", "--algo=fixed", "--qps", "200", "--burst", "7"]).unwrap();
        let file = DemoConfigFile {
            limiter: LimiterConfig::SlidingWindowLog { rate: 3, window: Duration::from_millis(10) },
            load: LoadConfig { qps: 1, seconds: 9, burst_attempts: 1, respect_retry_after: true },
        };

        let resolved = args.resolve(Some(file));

        assert_eq!(resolved.limiter, LimiterConfig::SlidingWindowLog { rate: 3, window: Duration::from_millis(10) });
        assert_eq!(resolved.load, LoadConfig { qps: 200, seconds: 9, burst_attempts: 7, respect_retry_after: true });
    }
}
