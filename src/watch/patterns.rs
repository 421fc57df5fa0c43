// src/watch/patterns.rs

//! Cross-platform glob matching for watch and ignore rules.
//!
//! A path matches a pattern when the first of these succeeds, after both
//! sides have had their separators unified and been lexically cleaned:
//!
//! 1. exact equality;
//! 2. a full recursive glob match (`*` and `?` never cross a separator);
//! 3. a literal pattern without separators equals any path component, so
//!    `.git` or `node_modules` match anywhere in the tree;
//! 4. a glob without separators matches any single component (including the
//!    base name);
//! 5. a literal pattern with a separator matches everything below it.
//!
//! A pattern with a trailing separator (`build/`) is a directory rule: it
//! matches whatever lies beneath a matching directory, never the directory
//! itself.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::errors::{Result, SentinelError};
use crate::watch::path_utils::{ends_with_separator, normalize};

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// One registered glob rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    pub pattern: String,
    recursive: bool,
    pub case_sensitive: bool,
}

impl FilePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let recursive = pattern.replace('\\', "/").contains("**");
        Self {
            pattern,
            recursive,
            case_sensitive: true,
        }
    }

    /// True when the pattern contains `**`.
    pub fn is_recursive(&self) -> bool {
        self.recursive
    }
}

#[derive(Debug, Default)]
pub struct PatternMatcher {
    patterns: Vec<FilePattern>,
    /// Compiled globs keyed by normalized pattern. `None` marks invalid syntax.
    compiled: Mutex<HashMap<String, Option<GlobMatcher>>>,
}

impl Clone for PatternMatcher {
    fn clone(&self) -> Self {
        Self {
            patterns: self.patterns.clone(),
            compiled: Mutex::new(HashMap::new()),
        }
    }
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `path` matches at least one of `patterns`.
    pub fn matches_any<S: AsRef<str>>(&self, path: &str, patterns: &[S]) -> bool {
        patterns
            .iter()
            .any(|p| self.matches_pattern(path, p.as_ref()))
    }

    pub fn matches_pattern(&self, path: &str, pattern: &str) -> bool {
        self.evaluate(path, pattern, true)
    }

    /// Evaluate `path` against the registered patterns, honouring each
    /// pattern's case sensitivity.
    pub fn matches_registered(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| self.evaluate(path, &p.pattern, p.case_sensitive))
    }

    pub fn patterns(&self) -> &[FilePattern] {
        &self.patterns
    }

    /// Register a pattern. Re-adding an identical pattern is a no-op.
    pub fn add_pattern(&mut self, pattern: FilePattern) -> Result<()> {
        if pattern.pattern.is_empty() {
            return Err(SentinelError::config("pattern must not be empty"));
        }
        let normalized = normalize(&pattern.pattern);
        GlobBuilder::new(&normalized)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                SentinelError::config(format!("invalid pattern {:?}: {e}", pattern.pattern))
            })?;

        if !self.patterns.contains(&pattern) {
            debug!(pattern = %pattern.pattern, recursive = pattern.recursive, "registered pattern");
            self.patterns.push(pattern);
        }
        Ok(())
    }

    /// Remove every registration of `pattern`. Returns whether any existed.
    pub fn remove_pattern(&mut self, pattern: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.pattern != pattern);
        self.patterns.len() != before
    }

    fn evaluate(&self, path: &str, pattern: &str, case_sensitive: bool) -> bool {
        if pattern.is_empty() {
            return false;
        }
        if path.is_empty() {
            return pattern == "**";
        }

        let (path, pattern): (Cow<'_, str>, Cow<'_, str>) = if case_sensitive {
            (Cow::Borrowed(path), Cow::Borrowed(pattern))
        } else {
            (Cow::Owned(path.to_lowercase()), Cow::Owned(pattern.to_lowercase()))
        };

        let np = normalize(&path);
        let npat = normalize(&pattern);

        if ends_with_separator(&pattern) {
            if npat == "/" {
                return np.starts_with('/') && np != "/";
            }
            return strict_ancestors(&np).any(|dir| self.matches_normalized(dir, &npat));
        }

        self.matches_normalized(&np, &npat)
    }

    fn matches_normalized(&self, np: &str, npat: &str) -> bool {
        if np == npat {
            return true;
        }
        if self.glob_matches(npat, np) {
            return true;
        }

        let has_meta = npat.contains(GLOB_META);
        if !npat.contains('/') {
            return if has_meta {
                np.split('/')
                    .any(|c| !c.is_empty() && self.glob_matches(npat, c))
            } else {
                np.split('/').any(|c| c == npat)
            };
        }

        if !has_meta {
            let prefix = if npat.ends_with('/') {
                npat.to_string()
            } else {
                format!("{npat}/")
            };
            return np.starts_with(&prefix);
        }

        false
    }

    fn glob_matches(&self, npat: &str, candidate: &str) -> bool {
        let mut compiled = match self.compiled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let matcher = compiled.entry(npat.to_string()).or_insert_with(|| {
            GlobBuilder::new(npat)
                .literal_separator(true)
                .build()
                .ok()
                .map(|g| g.compile_matcher())
        });
        matcher
            .as_ref()
            .is_some_and(|m| m.is_match(Path::new(candidate)))
    }
}

/// Every proper ancestor of a normalized path, shortest first.
/// `a/b/c` yields `a`, `a/b`; `/a/b` yields `/a`.
fn strict_ancestors(np: &str) -> impl Iterator<Item = &str> {
    np.match_indices('/')
        .map(|(i, _)| i)
        .filter(|&i| i > 0)
        .map(move |i| &np[..i])
}
