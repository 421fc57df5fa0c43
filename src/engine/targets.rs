// src/engine/targets.rs

//! Mapping from changed files to the packages that should be re-tested.
//!
//! A target is a directory relative to the project root (`.` for the root
//! itself). Directories outside the root keep their absolute form.

use std::path::{Path, PathBuf};

use crate::errors::{Result, SentinelError};
use crate::fs::{FileSystem, walk_dirs};
use crate::types::WatchMode;
use crate::watch::TestFileFinder;
use crate::watch::path_utils::{relative_str, slash_str};
use crate::watch::patterns::PatternMatcher;

/// Deduplicated targets in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    items: Vec<String>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: impl Into<String>) {
        let target = target.into();
        if !self.items.contains(&target) {
            self.items.push(target);
        }
    }

    pub fn extend<I, S>(&mut self, targets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for t in targets {
            self.insert(t);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}

pub fn relative_target(root: &Path, dir: &Path) -> String {
    match relative_str(root, dir) {
        Some(rel) if rel.is_empty() => ".".to_string(),
        Some(rel) => rel,
        None => slash_str(dir),
    }
}

fn dir_of(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Package directories for one changed file under `mode`. `All` is handled by
/// [`discover_packages`] and yields nothing here.
pub fn dirs_for_change(mode: WatchMode, finder: &TestFileFinder, file: &Path) -> Vec<PathBuf> {
    let is_test = finder.is_test_file(file);
    match mode {
        WatchMode::All => Vec::new(),
        WatchMode::Changed => {
            if is_test {
                return vec![dir_of(file)];
            }
            match finder.find_test_file(file) {
                Ok(test) => vec![dir_of(&test)],
                Err(_) => vec![dir_of(file)],
            }
        }
        WatchMode::Related => {
            if is_test {
                let mut dirs = vec![dir_of(file)];
                if let Ok(implementation) = finder.find_implementation_file(file) {
                    let d = dir_of(&implementation);
                    if !dirs.contains(&d) {
                        dirs.push(d);
                    }
                }
                return dirs;
            }
            match finder.find_package_tests(file) {
                Ok(tests) => {
                    let mut dirs: Vec<PathBuf> = Vec::new();
                    for t in tests {
                        let d = dir_of(&t);
                        if !dirs.contains(&d) {
                            dirs.push(d);
                        }
                    }
                    dirs
                }
                Err(_) => vec![dir_of(file)],
            }
        }
    }
}

/// Every non-ignored directory under `roots` that holds at least one test
/// file, in walk order.
pub fn discover_packages(
    fs: &dyn FileSystem,
    finder: &TestFileFinder,
    roots: &[PathBuf],
    ignore: &PatternMatcher,
) -> Result<Vec<PathBuf>> {
    let mut packages = Vec::new();
    for root in roots {
        if !fs.is_dir(root) {
            continue;
        }
        let dirs = walk_dirs(fs, root, |d| {
            relative_str(root, d).is_some_and(|rel| !rel.is_empty() && ignore.matches_registered(&rel))
        })
        .map_err(|e| SentinelError::Filesystem(e.context("discovering packages")))?;

        for dir in dirs {
            let has_tests = fs
                .read_dir(&dir)
                .map(|entries| entries.iter().any(|p| finder.is_test_file(p) && fs.is_file(p)))
                .unwrap_or(false);
            if has_tests && !packages.contains(&dir) {
                packages.push(dir);
            }
        }
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::watch::patterns::FilePattern;
    use std::sync::Arc;

    fn setup() -> (MockFileSystem, TestFileFinder) {
        let fs = MockFileSystem::with_cwd("/proj");
        fs.add_file("pkg/a.go", "");
        fs.add_file("pkg/a_test.go", "");
        fs.add_file("pkg/b_test.go", "");
        fs.add_file("util/u.go", "");
        fs.add_file("vendor/lib/l_test.go", "");
        let finder = TestFileFinder::new(Arc::new(fs.clone()));
        (fs, finder)
    }

    #[test]
    fn relative_targets() {
        let root = Path::new("/proj");
        assert_eq!(relative_target(root, Path::new("/proj")), ".");
        assert_eq!(relative_target(root, Path::new("/proj/pkg/x")), "pkg/x");
        assert_eq!(relative_target(root, Path::new("/elsewhere")), "/elsewhere");
    }

    #[test]
    fn changed_and_related_dirs() {
        let (_fs, finder) = setup();
        let a = Path::new("/proj/pkg/a.go");
        assert_eq!(
            dirs_for_change(WatchMode::Changed, &finder, a),
            vec![PathBuf::from("/proj/pkg")]
        );
        assert_eq!(
            dirs_for_change(WatchMode::Related, &finder, a),
            vec![PathBuf::from("/proj/pkg")]
        );
        assert_eq!(
            dirs_for_change(WatchMode::Related, &finder, Path::new("/proj/util/u.go")),
            vec![PathBuf::from("/proj/util")]
        );
        assert!(dirs_for_change(WatchMode::All, &finder, a).is_empty());
    }

    #[test]
    fn target_set_dedups_in_order() {
        let mut set = TargetSet::new();
        set.extend(["pkg", "util", "pkg"]);
        set.insert(".");
        assert_eq!(set.into_vec(), vec!["pkg", "util", "."]);
    }

    #[test]
    fn discovers_test_packages_skipping_ignored() {
        let (fs, finder) = setup();
        let mut ignore = PatternMatcher::new();
        ignore.add_pattern(FilePattern::new("vendor")).unwrap();

        let pkgs = discover_packages(&fs, &finder, &[PathBuf::from("/proj")], &ignore).unwrap();
        assert_eq!(pkgs, vec![PathBuf::from("/proj/pkg")]);
    }

    #[test]
    fn test_patterns_change_discovered_packages() {
        let (fs, finder) = setup();
        fs.add_file("web/a.ts", "");
        fs.add_file("web/a.spec.ts", "");
        let mut tests = PatternMatcher::new();
        tests.add_pattern(FilePattern::new("*.spec.ts")).unwrap();
        let finder = finder.with_test_patterns("/proj", tests);

        let pkgs =
            discover_packages(&fs, &finder, &[PathBuf::from("/proj")], &PatternMatcher::new())
                .unwrap();
        assert_eq!(pkgs, vec![PathBuf::from("/proj/web")]);
    }
}
