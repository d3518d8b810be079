use std::path::Path;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use config::FileFormat;
use rl_core::LimiterConfig;
use serde::Deserialize;

/// Prefix for environment overrides, e.g. `RL_LOAD__QPS=100`
pub const ENV_PREFIX: &str = "RL";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DemoConfigFile {
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub load: LoadConfig,
}

/// Load shape for the burst and steady demos
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub qps: u32,
    pub seconds: u64,
    pub burst_attempts: u32,
    pub respect_retry_after: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self { qps: 50, seconds: 5, burst_attempts: 50, respect_retry_after: true }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__").try_parsing(true)
}

/// Load a TOML demo config, then apply `RL_`-prefixed environment overrides
pub fn load_demo_config<P: AsRef<Path>>(path: P) -> Result<DemoConfigFile, ConfigError> {
    let config = Config::builder().add_source(File::from(path.as_ref())).add_source(environment()).build()?;

    let parsed: DemoConfigFile = config.try_deserialize()?;
    tracing::info!(path = %path.as_ref().display(), algorithm = parsed.limiter.algorithm(), "Loaded demo config");
    Ok(parsed)
}

/// Parse a demo config from TOML text without consulting the environment
pub fn parse_demo_config(toml: &str) -> Result<DemoConfigFile, ConfigError> {
    let config = Config::builder().add_source(File::from_str(toml, FileFormat::Toml)).build()?;

    config.try_deserialize()
}
