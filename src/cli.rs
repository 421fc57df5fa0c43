// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::model::RawConfigFile;
use crate::engine::options::DEFAULT_IGNORE_PATTERNS;
use crate::types::WatchMode;

/// Command-line arguments for `sentinel`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sentinel",
    version,
    about = "Watch source trees and re-run the tests affected by each change.",
    long_about = None
)]
pub struct CliArgs {
    /// Files or directories to watch. Defaults to the current directory.
    #[arg(value_name = "PATH")]
    pub paths: Vec<String>,

    /// Which tests to run after a change (all, changed, related).
    #[arg(long, value_name = "MODE")]
    pub mode: Option<WatchMode>,

    /// Additional ignore pattern. May be repeated.
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// Test file pattern, replacing the defaults. May be repeated.
    #[arg(long = "test-pattern", value_name = "PATTERN")]
    pub test_patterns: Vec<String>,

    /// Run every package once before watching.
    #[arg(long)]
    pub run_on_start: bool,

    /// Quiet period in milliseconds before a run starts.
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Path to the config file (TOML).
    ///
    /// If omitted, `sentinel.toml` in the current directory is used when present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SENTINEL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// Clear the terminal before each run.
    #[arg(long)]
    pub clear: bool,

    /// Skip files whose content did not change.
    #[arg(long)]
    pub use_hash: bool,

    /// Stop watching when the test command cannot be run.
    #[arg(long)]
    pub fail_fast: bool,

    /// Print the effective settings and exit without watching.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliArgs {
    /// Layer the flags that were given over a file config.
    ///
    /// Positional paths and `--test-pattern` replace the file's lists;
    /// `--ignore` extends them.
    pub fn apply_to(&self, raw: &mut RawConfigFile) {
        let watch = &mut raw.watch;
        if !self.paths.is_empty() {
            watch.paths = Some(self.paths.clone());
        }
        if let Some(mode) = self.mode {
            watch.mode = Some(mode.to_string());
        }
        if !self.ignore.is_empty() {
            watch
                .ignore
                .get_or_insert_with(|| {
                    DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect()
                })
                .extend(self.ignore.iter().cloned());
        }
        if !self.test_patterns.is_empty() {
            watch.test_patterns = Some(self.test_patterns.clone());
        }
        if let Some(ms) = self.debounce_ms {
            watch.debounce_ms = Some(ms);
        }
        if self.run_on_start {
            watch.run_on_start = Some(true);
        }
        if self.no_color {
            watch.color = Some(false);
        }
        if self.clear {
            watch.clear_terminal = Some(true);
        }
        if self.use_hash {
            watch.use_hash = Some(true);
        }
        if self.fail_fast {
            watch.fail_fast = Some(true);
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ConfigFile;
    use std::time::Duration;

    fn parse_from(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("sentinel").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_file_values() {
        let mut raw = crate::config::load_from_str(
            "[watch]\nmode = \"all\"\ndebounce_ms = 900\nignore = [\"dist\"]\n",
        )
        .unwrap();
        let args = parse_from(&[
            "src",
            "--mode",
            "related",
            "--debounce-ms",
            "100",
            "--ignore",
            "tmp",
            "--no-color",
        ]);
        args.apply_to(&mut raw);
        let cfg = ConfigFile::try_from(raw).unwrap();

        assert_eq!(cfg.paths, vec!["src"]);
        assert_eq!(cfg.mode, WatchMode::Related);
        assert_eq!(cfg.debounce, Duration::from_millis(100));
        assert_eq!(cfg.ignore, vec!["dist", "tmp"]);
        assert!(!cfg.color);
    }

    #[test]
    fn extra_ignore_keeps_defaults() {
        let mut raw = RawConfigFile::default();
        parse_from(&["--ignore", "build"]).apply_to(&mut raw);
        let cfg = ConfigFile::try_from(raw).unwrap();
        assert!(cfg.ignore.contains(&"vendor".to_string()));
        assert!(cfg.ignore.contains(&"build".to_string()));
    }

    #[test]
    fn rejects_unknown_mode() {
        let res = CliArgs::try_parse_from(["sentinel", "--mode", "sometimes"]);
        assert!(res.is_err());
    }
}
