// src/cache/mod.rs

//! In-memory record of the last known test outcome per path, and the
//! change-analysis procedure built on top of it.

pub mod change;
pub mod hash;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::errors::{Result, SentinelError};
use crate::fs::FileSystem;
use crate::results::TestSuite;
use crate::watch::clock::Clock;
use crate::watch::finder::TestFileFinder;

pub use change::{Change, ChangeType, declared_tests};

#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    pub suite: TestSuite,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cached_results: usize,
    pub tracked_tests: usize,
    pub tracked_hashes: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Keys are the exact path strings callers pass in; nothing is normalized.
#[derive(Debug)]
pub struct TestResultCache {
    results: HashMap<String, CachedResult>,
    hashes: HashMap<String, String>,
    finder: TestFileFinder,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
}

impl TestResultCache {
    pub fn new(fs: Arc<dyn FileSystem>, clock: Arc<dyn Clock>) -> Self {
        Self {
            results: HashMap::new(),
            hashes: HashMap::new(),
            finder: TestFileFinder::new(Arc::clone(&fs)),
            fs,
            clock,
        }
    }

    /// Classify and pair files with `finder` instead of the default one.
    pub fn set_finder(&mut self, finder: TestFileFinder) {
        self.finder = finder;
    }

    pub fn cache_result(&mut self, path: impl Into<String>, suite: TestSuite) {
        let path = path.into();
        debug!(path = %path, tests = suite.tests.len(), "caching result");
        self.results.insert(
            path,
            CachedResult {
                suite,
                cached_at: self.clock.now(),
            },
        );
    }

    pub fn get_cached_result(&self, path: &str) -> Option<&CachedResult> {
        self.results.get(path)
    }

    /// Classify a change to `path` and resolve the tests it affects.
    pub fn analyze_change(&self, path: &str) -> Result<Change> {
        if path.trim().is_empty() {
            return Err(SentinelError::config("file path must not be empty"));
        }

        let file = Path::new(path);
        let is_new = !self.results.contains_key(path);
        let content_hash = hash::compute_file_hash(&*self.fs, file).ok();

        if self.finder.is_test_file(file) {
            let source = self.fs.read_to_string(file).map_err(|e| {
                SentinelError::Filesystem(e.context(format!("failed to read test file {path:?}")))
            })?;
            return Ok(Change {
                path: path.to_string(),
                change_type: ChangeType::Test,
                is_new,
                affected_tests: declared_tests(&source),
                content_hash,
            });
        }

        let (change_type, affected_tests) = match self.finder.find_test_file(file) {
            Ok(test_file) => {
                let affected = match self.fs.read_to_string(&test_file) {
                    Ok(source) => declared_tests(&source),
                    Err(err) => {
                        warn!(test_file = %test_file.display(), error = %err, "cannot read paired test file");
                        Vec::new()
                    }
                };
                (ChangeType::Implementation, affected)
            }
            Err(SentinelError::NotFound(_)) if change::has_source_extension(file) => {
                (ChangeType::Implementation, Vec::new())
            }
            Err(SentinelError::NotFound(_)) => (ChangeType::Other, Vec::new()),
            Err(err) => return Err(err),
        };

        Ok(Change {
            path: path.to_string(),
            change_type,
            is_new,
            affected_tests,
            content_hash,
        })
    }

    /// Record `hash` for `path`; true when it differs from the previous one
    /// (or there was none).
    pub fn has_content_changed(&mut self, path: &str, hash: &str) -> bool {
        match self.hashes.get(path) {
            Some(prev) if prev == hash => false,
            _ => {
                self.hashes.insert(path.to_string(), hash.to_string());
                true
            }
        }
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.hashes.clear();
    }

    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            cached_results: self.results.len(),
            tracked_tests: self.results.values().map(|r| r.suite.tests.len()).sum(),
            tracked_hashes: self.hashes.len(),
            oldest: self.results.values().map(|r| r.cached_at).min(),
            newest: self.results.values().map(|r| r.cached_at).max(),
        }
    }
}
