use std::io;
use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Initialise tracing to stdout, plus a non-blocking hourly log file when `log_dir` is given
///
/// `RUST_LOG` overrides `default_level`. Keep the returned guard alive until exit or buffered
/// file output is lost.
pub fn init(app_name: &str, log_dir: Option<&Path>, default_level: Level) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();

    let stdout_layer = fmt::layer().with_writer(io::stdout).with_target(true).with_line_number(true).with_ansi(true).compact();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let _ = std::fs::create_dir_all(dir);

            // Background thread handles all file I/O
            let file_appender = tracing_appender::rolling::hourly(dir, format!("{app_name}.log"));
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer =
                fmt::layer().with_writer(non_blocking).with_target(true).with_thread_ids(true).with_line_number(true).with_ansi(false).compact();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(env_filter).with(stdout_layer).with(file_layer).init();

    guard
}
