// src/logging.rs

//! Logging setup for `sentinel` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `SENTINEL_LOG` environment variable (a level such as "debug", or a
//!    full filter directive such as "sentinel::watch=trace")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout carries only test output.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "SENTINEL_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(level_from_log_level(lvl).as_str()),
        None => filter_from_env(std::env::var(LOG_ENV_VAR).ok().as_deref()),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))
}

fn filter_from_env(value: Option<&str>) -> EnvFilter {
    let Some(raw) = value.map(str::trim).filter(|s| !s.is_empty()) else {
        return EnvFilter::new("info");
    };
    match parse_level_str(raw) {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_new(raw).unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_names() {
        assert_eq!(parse_level_str(" Warning "), Some(tracing::Level::WARN));
        assert_eq!(parse_level_str("TRACE"), Some(tracing::Level::TRACE));
        assert_eq!(parse_level_str("loud"), None);
    }

    #[test]
    fn env_filter_accepts_directives() {
        use tracing_subscriber::filter::LevelFilter;

        assert_eq!(filter_from_env(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(filter_from_env(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(
            filter_from_env(Some("sentinel::watch=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
    }
}
