// src/engine/options.rs

use std::time::Duration;

use crate::errors::{Result, SentinelError};
use crate::results::OutputSink;
use crate::types::WatchMode;

/// Default quiet period before a batch of changes triggers a run.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[".git", "node_modules", "vendor", "target"];
pub const DEFAULT_TEST_PATTERNS: &[&str] = &["*_test.*", "*_test"];

/// Run configuration for a [`WatchCoordinator`](super::WatchCoordinator).
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Roots to watch. Empty means the current directory.
    pub paths: Vec<String>,
    pub mode: WatchMode,
    pub ignore_patterns: Vec<String>,
    pub test_patterns: Vec<String>,
    /// Run every package once before watching.
    pub run_on_start: bool,
    pub debounce: Duration,
    /// Clear the terminal before each run.
    pub clear_terminal: bool,
    /// Skip files whose content hash did not change since the last run.
    pub use_hash: bool,
    /// Stop watching when a test run fails to execute.
    pub fail_fast: bool,
    pub color: bool,
    pub output: OutputSink,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            paths: vec![".".to_string()],
            mode: WatchMode::default(),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            test_patterns: DEFAULT_TEST_PATTERNS.iter().map(|s| s.to_string()).collect(),
            run_on_start: false,
            debounce: DEFAULT_DEBOUNCE,
            clear_terminal: false,
            use_hash: false,
            fail_fast: false,
            color: true,
            output: OutputSink::stdout(),
        }
    }
}

impl WatchOptions {
    pub fn validate(&self) -> Result<()> {
        if let Some(i) = self.paths.iter().position(|p| p.trim().is_empty()) {
            return Err(SentinelError::config(format!("watch path #{i} is empty")));
        }
        if self.debounce.is_zero() {
            return Err(SentinelError::config("debounce interval must be greater than zero"));
        }
        if self.ignore_patterns.iter().any(|p| p.is_empty())
            || self.test_patterns.iter().any(|p| p.is_empty())
        {
            return Err(SentinelError::config("patterns must not be empty"));
        }
        Ok(())
    }

    /// Paths to watch, with the current directory substituted for none.
    pub fn effective_paths(&self) -> Vec<String> {
        if self.paths.is_empty() {
            vec![".".to_string()]
        } else {
            self.paths.clone()
        }
    }
}
