//! Tracing initialisation.

use std::sync::OnceLock;

use jobvisor_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Console and daily rolling file output for the supervisor.
pub(crate) fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("jobvisor")
        .filename_suffix("log")
        .max_log_files(config.max_files)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt::layer().with_target(true).with_ansi(config.ansi))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

/// JSON records on stdout, parsed back by the supervisor's log relay.
pub(crate) fn init_child_tracing(config: &LoggingConfig) {
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_writer(std::io::stdout),
        )
        .init();
}
