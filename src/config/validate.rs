// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, SentinelError};
use crate::types::WatchMode;
use crate::watch::patterns::{FilePattern, PatternMatcher};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SentinelError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let mode = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, mode))
    }
}

/// Check a raw config and return its parsed watch mode.
pub fn validate_config(cfg: &RawConfigFile) -> Result<WatchMode> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<WatchMode> {
    let mode = validate_mode(cfg)?;
    validate_paths(cfg)?;
    validate_patterns(cfg.watch.ignore.as_deref().unwrap_or_default(), "ignore")?;
    validate_patterns(
        cfg.watch.test_patterns.as_deref().unwrap_or_default(),
        "test_patterns",
    )?;
    validate_runner(cfg)?;

    if cfg.watch.debounce_ms == Some(0) {
        return Err(SentinelError::config(
            "watch.debounce_ms must be greater than zero",
        ));
    }
    Ok(mode)
}

fn validate_mode(cfg: &RawConfigFile) -> Result<WatchMode> {
    match cfg.watch.mode.as_deref() {
        None => Ok(WatchMode::default()),
        Some(s) => s.parse::<WatchMode>().map_err(SentinelError::Config),
    }
}

fn validate_paths(cfg: &RawConfigFile) -> Result<()> {
    if let Some(paths) = &cfg.watch.paths {
        if paths.iter().any(|p| p.trim().is_empty()) {
            return Err(SentinelError::config("watch.paths must not contain empty paths"));
        }
    }
    Ok(())
}

fn validate_patterns(patterns: &[String], field: &str) -> Result<()> {
    let mut matcher = PatternMatcher::new();
    for p in patterns {
        matcher
            .add_pattern(FilePattern::new(p.as_str()))
            .map_err(|e| SentinelError::config(format!("watch.{field}: {e}")))?;
    }
    Ok(())
}

fn validate_runner(cfg: &RawConfigFile) -> Result<()> {
    if let Some(cmd) = &cfg.runner.command {
        if cmd.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(SentinelError::config("runner.command must name a program"));
        }
    }
    Ok(())
}
