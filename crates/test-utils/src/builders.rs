#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sentinel::engine::WatchOptions;
use sentinel::fs::mock::MockFileSystem;
use sentinel::results::{OutputSink, SharedBuffer};
use sentinel::types::WatchMode;
use sentinel::watch::mock::MockNotifierFactory;
use sentinel::watch::{FixedClock, WatcherDeps};

/// Builder for `WatchOptions` to simplify test setup.
///
/// Output goes to an in-memory buffer and the debounce window defaults to
/// 20ms so tests settle quickly.
pub struct WatchOptionsBuilder {
    options: WatchOptions,
    buffer: SharedBuffer,
}

impl WatchOptionsBuilder {
    pub fn new() -> Self {
        let (output, buffer) = OutputSink::buffer();
        Self {
            options: WatchOptions {
                debounce: Duration::from_millis(20),
                color: false,
                output,
                ..WatchOptions::default()
            },
            buffer,
        }
    }

    pub fn with_paths(mut self, paths: &[&str]) -> Self {
        self.options.paths = paths.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_mode(mut self, mode: WatchMode) -> Self {
        self.options.mode = mode;
        self
    }

    pub fn with_ignore(mut self, pattern: &str) -> Self {
        self.options.ignore_patterns.push(pattern.to_string());
        self
    }

    /// Replace the default test patterns.
    pub fn with_test_patterns(mut self, patterns: &[&str]) -> Self {
        self.options.test_patterns = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.options.debounce = Duration::from_millis(ms);
        self
    }

    pub fn run_on_start(mut self, val: bool) -> Self {
        self.options.run_on_start = val;
        self
    }

    pub fn use_hash(mut self, val: bool) -> Self {
        self.options.use_hash = val;
        self
    }

    pub fn fail_fast(mut self, val: bool) -> Self {
        self.options.fail_fast = val;
        self
    }

    /// Send output to `sink` instead of the in-memory buffer.
    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.options.output = sink;
        self
    }

    /// The buffer the built options write to.
    pub fn buffer(&self) -> SharedBuffer {
        self.buffer.clone()
    }

    pub fn build(self) -> WatchOptions {
        self.options
    }
}

impl Default for WatchOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Watcher dependencies backed by the given mocks and a fixed clock.
pub fn mock_deps(fs: &MockFileSystem, notifiers: &MockNotifierFactory) -> WatcherDeps {
    WatcherDeps {
        fs: Arc::new(fs.clone()),
        clock: Arc::new(FixedClock::new(chrono::DateTime::UNIX_EPOCH)),
        notifiers: Arc::new(notifiers.clone()),
    }
}
