//! Console and daily-rolling file logging

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

use crate::Result;

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "grantscout.log";

/// Filter directive for a level, applied to this crate and its dependencies
#[must_use]
pub fn filter_directive(level: &str) -> String {
    format!("{level},grantscout={level},sqlx=warn,hyper=warn,reqwest=warn")
}

/// Initialize logging from configuration; `verbose` forces debug.
/// Without a config `RUST_LOG` is honored, else info. Keep the returned
/// guard alive for the lifetime of the process so the file writer flushes.
pub fn init_logging(
    config: Option<&crate::config::AppConfig>,
    verbose: bool,
) -> Result<WorkerGuard> {
    let env_filter = match (verbose, config) {
        (true, _) => EnvFilter::new(filter_directive("debug")),
        (false, Some(config)) => EnvFilter::new(filter_directive(&config.logging.level)),
        (false, None) => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_directive("info"))),
    };
    let backtrace = config.is_some_and(|config| config.logging.backtrace);
    init_with_filter(env_filter, backtrace)
}

fn init_with_filter(env_filter: EnvFilter, backtrace: bool) -> Result<WorkerGuard> {
    let logs_dir = Path::new(LOG_DIR);
    if !logs_dir.exists() {
        std::fs::create_dir_all(logs_dir)?;
    }
    if backtrace {
        std::env::set_var("RUST_BACKTRACE", "1");
    }

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(non_blocking)
        .with_ansi(false);

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::GrantScoutError::Custom(format!("Logging already initialized: {e}")))?;

    tracing::info!("Log files will be saved to: {}/{}.YYYY-MM-DD", LOG_DIR, LOG_FILE);
    Ok(guard)
}
