// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::engine::options::{
    DEFAULT_DEBOUNCE, DEFAULT_IGNORE_PATTERNS, DEFAULT_TEST_PATTERNS, WatchOptions,
};
use crate::exec::runner::{DEFAULT_COMMAND, DEFAULT_TARGET_TEMPLATE};
use crate::results::OutputSink;
use crate::types::WatchMode;

/// Configuration as read from `sentinel.toml`, before validation.
///
/// ```toml
/// [watch]
/// paths = ["."]
/// mode = "changed"
/// ignore = ["vendor", ".git"]
/// debounce_ms = 300
///
/// [runner]
/// command = ["go", "test", "-json"]
/// target_template = "./{}"
/// ```
///
/// Every field is optional so command-line flags can be layered on top.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub runner: RunnerSection,
}

/// `[watch]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    pub paths: Option<Vec<String>>,
    /// `"all"`, `"changed"` or `"related"`.
    pub mode: Option<String>,
    pub ignore: Option<Vec<String>>,
    pub test_patterns: Option<Vec<String>>,
    pub debounce_ms: Option<u64>,
    pub run_on_start: Option<bool>,
    pub clear_terminal: Option<bool>,
    pub use_hash: Option<bool>,
    pub fail_fast: Option<bool>,
    pub color: Option<bool>,
}

/// `[runner]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerSection {
    pub command: Option<Vec<String>>,
    pub target_template: Option<String>,
}

/// Validated configuration with defaults applied.
///
/// Obtain one through `ConfigFile::try_from(raw)` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub paths: Vec<String>,
    pub mode: WatchMode,
    pub ignore: Vec<String>,
    pub test_patterns: Vec<String>,
    pub debounce: Duration,
    pub run_on_start: bool,
    pub clear_terminal: bool,
    pub use_hash: bool,
    pub fail_fast: bool,
    pub color: bool,
    pub command: Vec<String>,
    pub target_template: String,
}

impl ConfigFile {
    /// Build from already-checked parts. Use `TryFrom<RawConfigFile>` instead.
    pub(crate) fn new_unchecked(raw: RawConfigFile, mode: WatchMode) -> Self {
        let w = raw.watch;
        let r = raw.runner;
        Self {
            paths: w.paths.unwrap_or_else(|| vec![".".to_string()]),
            mode,
            ignore: w
                .ignore
                .unwrap_or_else(|| to_strings(DEFAULT_IGNORE_PATTERNS)),
            test_patterns: w
                .test_patterns
                .unwrap_or_else(|| to_strings(DEFAULT_TEST_PATTERNS)),
            debounce: w
                .debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DEBOUNCE),
            run_on_start: w.run_on_start.unwrap_or(false),
            clear_terminal: w.clear_terminal.unwrap_or(false),
            use_hash: w.use_hash.unwrap_or(false),
            fail_fast: w.fail_fast.unwrap_or(false),
            color: w.color.unwrap_or(true),
            command: r.command.unwrap_or_else(|| to_strings(DEFAULT_COMMAND)),
            target_template: r
                .target_template
                .unwrap_or_else(|| DEFAULT_TARGET_TEMPLATE.to_string()),
        }
    }

    pub fn watch_options(&self, output: OutputSink) -> WatchOptions {
        WatchOptions {
            paths: self.paths.clone(),
            mode: self.mode,
            ignore_patterns: self.ignore.clone(),
            test_patterns: self.test_patterns.clone(),
            run_on_start: self.run_on_start,
            debounce: self.debounce,
            clear_terminal: self.clear_terminal,
            use_hash: self.use_hash,
            fail_fast: self.fail_fast,
            color: self.color,
            output,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
