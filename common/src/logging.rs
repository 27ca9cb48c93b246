//! Shared terminal+file logging setup: every binary in the workspace
//! (entry point, room, person) wires up the same `tracing_subscriber`
//! terminal layer plus a `tracing-appender` daily rolling file layer
//! under `~/.unn/logs/`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::error::UnnError;

/// Log verbosity, matching the CLI surface's `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "lower")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        write!(f, "{s}")
    }
}

impl LogLevel {
    fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Install the global tracing subscriber: a terminal layer at `level` plus
/// a daily-rolling file layer (always at `trace`, independent of the
/// terminal's chosen level) under `log_dir/<file_prefix>.log.<date>`.
///
/// Returns the file appender's `WorkerGuard`; the caller must keep it alive
/// for the process's lifetime or buffered log lines are lost on exit.
pub fn init(level: LogLevel, log_dir: &Path, file_prefix: &str) -> Result<WorkerGuard, UnnError> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| UnnError::Configuration(format!("failed to create {}: {e}", log_dir.display())))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, format!("{file_prefix}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let terminal_filter = EnvFilter::try_new(level.as_filter_str())
        .map_err(|e| UnnError::Configuration(format!("invalid log level: {e}")))?;

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_filter(terminal_filter),
    );

    if let LogLevel::Off = level {
        registry.init();
        return Ok(guard);
    }

    registry
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("trace")),
        )
        .init();

    Ok(guard)
}

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;
