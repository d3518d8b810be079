use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use clap::Parser;
use rl_app::cli::DemoArgs;
use rl_app::config_loader;
use rl_app::demo;
use rl_app::demo::SteadyParams;
use rl_app::shutdown_handler;
use rl_app::tracing_setup;
use rl_core::TimeSource;
use tracing::Level;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let args = DemoArgs::parse();
    let _guard = tracing_setup::init("rl_demo", args.log_dir.as_deref(), Level::INFO);

    let file = match &args.config {
        Some(path) => Some(config_loader::load_demo_config(path).with_context(|| format!("loading {}", path.display()))?),
        None => None,
    };
    let settings = args.resolve(file);
    info!(algorithm = settings.limiter.algorithm(), limiter = ?settings.limiter, load = ?settings.load, "Starting rate limiter demo");

    let running = Arc::new(AtomicBool::new(true));
    shutdown_handler::setup(Arc::clone(&running))?;

    let clock = TimeSource::new();

    // Fresh limiter per demo so the burst does not drain the steady run
    let limiter = settings.limiter.build()?;
    let burst = demo::run_burst(limiter.as_ref(), &clock, settings.load.burst_attempts, 1)?;
    burst.log();

    let limiter = settings.limiter.build()?;
    let params = SteadyParams::from(&settings.load);
    let steady = demo::run_steady(limiter.as_ref(), &clock, &params, &running, &mut rand::thread_rng(), std::thread::sleep)?;
    steady.log();

    Ok(())
}
