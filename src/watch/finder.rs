// src/watch/finder.rs

//! Filename-convention pairing of implementation and test files.
//!
//! `pkg/parser.go` pairs with `pkg/parser_test.go`; an extensionless `pkg/a`
//! pairs with `pkg/a_test`. Pairs always live in the same directory.
//!
//! Which files count as tests follows the configured test patterns when the
//! finder has them, and the `_test` convention otherwise.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{Result, SentinelError};
use crate::fs::FileSystem;
use crate::watch::path_utils::{relative_str, slash_str};
use crate::watch::patterns::PatternMatcher;

const TEST_SUFFIX: &str = "_test";

#[derive(Debug, Clone)]
struct TestPatterns {
    root: PathBuf,
    matcher: Arc<PatternMatcher>,
}

#[derive(Debug, Clone)]
pub struct TestFileFinder {
    fs: Arc<dyn FileSystem>,
    patterns: Option<TestPatterns>,
}

impl TestFileFinder {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs, patterns: None }
    }

    /// Classify test files with `matcher`, evaluated against paths relative
    /// to `root`. An empty matcher keeps the `_test` convention.
    pub fn with_test_patterns(mut self, root: impl Into<PathBuf>, matcher: PatternMatcher) -> Self {
        self.patterns = if matcher.patterns().is_empty() {
            None
        } else {
            Some(TestPatterns {
                root: root.into(),
                matcher: Arc::new(matcher),
            })
        };
        self
    }

    /// True when `path` matches a configured test pattern or, without any,
    /// when the file stem ends in `_test` (and has a name before it).
    pub fn is_test_file(&self, path: &Path) -> bool {
        let Some(patterns) = &self.patterns else {
            return is_test_file(path);
        };
        let candidate = match relative_str(&patterns.root, path) {
            Some(rel) if rel.is_empty() => return false,
            Some(rel) => rel,
            None => slash_str(path),
        };
        patterns.matcher.matches_registered(&candidate)
    }

    /// The test file paired with `path`. A test file maps to itself.
    pub fn find_test_file(&self, path: &Path) -> Result<PathBuf> {
        ensure_non_empty(path)?;
        if self.is_test_file(path) {
            return Ok(path.to_path_buf());
        }

        let (stem, ext) = split_name(path)?;
        let candidate = sibling(path, &format!("{stem}{TEST_SUFFIX}"), ext);
        if self.is_test_file(&candidate) && self.fs.is_file(&candidate) {
            Ok(candidate)
        } else {
            Err(SentinelError::NotFound(format!(
                "no test file for {}",
                path.display()
            )))
        }
    }

    /// The implementation file a test file covers.
    pub fn find_implementation_file(&self, path: &Path) -> Result<PathBuf> {
        ensure_non_empty(path)?;
        if !self.is_test_file(path) {
            return Err(SentinelError::NotFound(format!(
                "{} is not a test file",
                path.display()
            )));
        }

        let (stem, ext) = split_name(path)?;
        let name = match stem.strip_suffix(TEST_SUFFIX) {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(SentinelError::NotFound(format!(
                    "no implementation file for {}",
                    path.display()
                )));
            }
        };
        let candidate = sibling(path, name, ext);
        if !self.is_test_file(&candidate) && self.fs.is_file(&candidate) {
            Ok(candidate)
        } else {
            Err(SentinelError::NotFound(format!(
                "no implementation file for {}",
                path.display()
            )))
        }
    }

    /// Every test file in the directory of `path` (or in `path` itself when
    /// it is a directory), sorted.
    pub fn find_package_tests(&self, path: &Path) -> Result<Vec<PathBuf>> {
        ensure_non_empty(path)?;
        let dir = if self.fs.is_dir(path) {
            path
        } else {
            path.parent().unwrap_or(Path::new("."))
        };

        let entries = self.fs.read_dir(dir).map_err(|e| {
            SentinelError::Filesystem(e.context(format!("failed to list {:?}", dir)))
        })?;
        let mut tests: Vec<PathBuf> = entries
            .into_iter()
            .filter(|p| self.is_test_file(p) && self.fs.is_file(p))
            .collect();
        tests.sort();

        if tests.is_empty() {
            return Err(SentinelError::NotFound(format!(
                "no test files in {}",
                dir.display()
            )));
        }
        Ok(tests)
    }
}

pub fn is_test_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| stem.len() > TEST_SUFFIX.len() && stem.ends_with(TEST_SUFFIX))
}

fn ensure_non_empty(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(SentinelError::config("file path must not be empty"));
    }
    Ok(())
}

fn split_name(path: &Path) -> Result<(&str, Option<&str>)> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| SentinelError::config(format!("{} has no file name", path.display())))?;
    let ext = path.extension().and_then(|e| e.to_str());
    Ok((stem, ext))
}

fn sibling(path: &Path, stem: &str, ext: Option<&str>) -> PathBuf {
    let name = match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    };
    path.with_file_name(name)
}
