//!
//! src/logging.rs  Andrew Belles  Oct 19th, 2026
//!
//! Initializes logger so resolutions and library writes give
//! informative, structured output while running
//!
//!

use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tracing_error::ErrorLayer;
use tracing_appender::non_blocking;

use crate::config::{LogFormat, LoggingConfig};

/// Flushes buffered log lines when dropped; hold it for the life of main
pub struct LoggingGuard(tracing_appender::non_blocking::WorkerGuard);

fn env_filter(cfg: &LoggingConfig) -> EnvFilter {
    std::env::var("RUST_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(cfg.filter_directives.clone()))
}

pub fn init_logging(cfg: &LoggingConfig) ->
    Result<LoggingGuard, crate::errors::RecordingDateError> {

    let (writer, guard) = non_blocking(std::io::stderr());
    let time = fmt::time::UtcTime::rfc_3339();

    let registry = tracing_subscriber::registry()
        .with(env_filter(cfg))
        .with(ErrorLayer::default());

    let result = match cfg.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(writer)
                .with_timer(time)
                .with_ansi(false)
                .with_target(cfg.include_target)
                .with_file(cfg.include_file_line)
                .with_line_number(cfg.include_file_line)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true);
            registry.with(fmt_layer).try_init()
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_writer(writer)
                .with_timer(time)
                .with_ansi(cfg.with_ansi)
                .with_target(cfg.include_target)
                .with_file(cfg.include_file_line)
                .with_line_number(cfg.include_file_line);
            registry.with(fmt_layer).try_init()
        }
    };

    result.map_err(|e| crate::errors::RecordingDateError::Config(
        format!("logger already initialised: {e}")
    ))?;
    Ok( LoggingGuard(guard) )
}
