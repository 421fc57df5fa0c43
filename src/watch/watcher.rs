// src/watch/watcher.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::errors::{Result, SentinelError};
use crate::fs::{EntryKind, FileSystem, RealFileSystem, walk_dirs};
use crate::types::FileEventKind;
use crate::watch::clock::{Clock, SystemClock};
use crate::watch::event::{FileEvent, RawEvent};
use crate::watch::notifier::{Notifier, NotifierFactory, NotifyNotifierFactory};
use crate::watch::path_utils::{relative_str, slash_str};
use crate::watch::patterns::{FilePattern, PatternMatcher};

/// Everything the watcher needs from the outside world.
#[derive(Debug, Clone)]
pub struct WatcherDeps {
    pub fs: Arc<dyn FileSystem>,
    pub clock: Arc<dyn Clock>,
    pub notifiers: Arc<dyn NotifierFactory>,
}

impl Default for WatcherDeps {
    fn default() -> Self {
        Self {
            fs: Arc::new(RealFileSystem),
            clock: Arc::new(SystemClock),
            notifiers: Arc::new(NotifyNotifierFactory),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackedPath {
    path: PathBuf,
    is_dir: bool,
}

impl TrackedPath {
    /// Directory that patterns are evaluated relative to.
    fn match_root(&self) -> &Path {
        if self.is_dir {
            &self.path
        } else {
            self.path.parent().unwrap_or(&self.path)
        }
    }
}

/// Filters native change notifications into a stream of [`FileEvent`]s.
///
/// Configured paths are registered when [`watch`](Self::watch) starts;
/// directories are walked and each non-ignored subdirectory is registered on
/// its own. Directories created while watching are picked up from their
/// create events.
#[derive(Debug)]
pub struct FileSystemWatcher {
    configured: Vec<String>,
    tracked: Vec<TrackedPath>,
    registered: BTreeSet<PathBuf>,
    ignore: PatternMatcher,
    tests: PatternMatcher,
    notifier: Box<dyn Notifier>,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
}

impl FileSystemWatcher {
    pub fn new(
        paths: Vec<String>,
        ignore_patterns: &[String],
        test_patterns: &[String],
        deps: WatcherDeps,
    ) -> Result<Self> {
        let ignore = build_matcher(ignore_patterns)?;
        let tests = build_matcher(test_patterns)?;
        let notifier = deps.notifiers.create()?;

        Ok(Self {
            configured: paths,
            tracked: Vec::new(),
            registered: BTreeSet::new(),
            ignore,
            tests,
            notifier,
            fs: deps.fs,
            clock: deps.clock,
        })
    }

    /// Paths passed in by configuration or `add_path`, as given.
    pub fn configured_paths(&self) -> &[String] {
        &self.configured
    }

    /// Absolute paths currently tracked.
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.tracked.iter().map(|t| t.path.clone()).collect()
    }

    /// Directories registered with the native notifier.
    pub fn registered_dirs(&self) -> Vec<PathBuf> {
        self.registered.iter().cloned().collect()
    }

    /// Replace the configured paths and patterns.
    ///
    /// Tracked paths absent from the new list are dropped right away; new
    /// paths are registered on the next [`watch`](Self::watch) or
    /// [`add_path`](Self::add_path).
    pub fn reconfigure(
        &mut self,
        paths: Vec<String>,
        ignore_patterns: &[String],
        test_patterns: &[String],
    ) -> Result<()> {
        let ignore = build_matcher(ignore_patterns)?;
        let tests = build_matcher(test_patterns)?;

        let mut keep = Vec::with_capacity(paths.len());
        for p in &paths {
            if let Ok(abs) = self.fs.absolute(Path::new(p)) {
                keep.push(abs);
            }
        }
        let stale: Vec<PathBuf> = self
            .tracked
            .iter()
            .filter(|t| !keep.contains(&t.path))
            .map(|t| t.path.clone())
            .collect();
        for path in stale {
            self.untrack(&path)?;
        }

        self.configured = paths;
        self.ignore = ignore;
        self.tests = tests;
        Ok(())
    }

    /// Start tracking `path`. Re-adding a tracked path is a no-op.
    pub fn add_path(&mut self, path: &str) -> Result<()> {
        if path.trim().is_empty() {
            return Err(SentinelError::config("watch path must not be empty"));
        }

        let abs = self.fs.absolute(Path::new(path)).map_err(|e| {
            SentinelError::Filesystem(e.context(format!("failed to resolve path {path:?}")))
        })?;

        if self.tracked.iter().any(|t| t.path == abs) {
            debug!(path = %abs.display(), "path already tracked");
            return Ok(());
        }

        let kind = self.fs.metadata(&abs).map_err(|e| {
            SentinelError::Filesystem(e.context(format!("failed to stat path {:?}", abs)))
        })?;

        match kind {
            EntryKind::Dir => self.register_tree(&abs, &abs)?,
            EntryKind::File => {
                let parent = abs.parent().map(Path::to_path_buf).ok_or_else(|| {
                    SentinelError::config(format!("file {:?} has no parent directory", abs))
                })?;
                self.register_dir(&parent)?;
            }
        }

        self.tracked.push(TrackedPath {
            path: abs,
            is_dir: kind == EntryKind::Dir,
        });
        if !self.configured.iter().any(|p| p == path) {
            self.configured.push(path.to_string());
        }
        Ok(())
    }

    /// Stop tracking `path` and unregister directories nothing else needs.
    pub fn remove_path(&mut self, path: &str) -> Result<()> {
        let abs = self.fs.absolute(Path::new(path)).map_err(|e| {
            SentinelError::Filesystem(e.context(format!("failed to resolve path {path:?}")))
        })?;
        self.untrack(&abs)?;

        let fs = Arc::clone(&self.fs);
        self.configured
            .retain(|p| fs.absolute(Path::new(p)).map(|a| a != abs).unwrap_or(true));
        Ok(())
    }

    /// Release the native notifier. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        self.registered.clear();
        self.notifier.close()
    }

    /// Whether `path` falls under an ignore pattern, evaluated relative to
    /// the tracked root containing it.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let root = self.containing_root(path).map(TrackedPath::match_root);
        matches_relative(&self.ignore, root, path)
    }

    pub fn is_test(&self, path: &Path) -> bool {
        let root = self.containing_root(path).map(TrackedPath::match_root);
        matches_relative(&self.tests, root, path)
    }

    /// Register the configured paths and forward filtered events to `out`
    /// until `ctx` is cancelled or the notifier fails.
    pub async fn watch(
        &mut self,
        ctx: CancellationToken,
        out: mpsc::Sender<FileEvent>,
    ) -> Result<()> {
        for path in self.configured.clone() {
            self.add_path(&path)?;
        }
        info!(
            paths = self.tracked.len(),
            dirs = self.registered.len(),
            "watching for changes"
        );

        loop {
            let raw = {
                let (events, errors) = self.notifier.channels();
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return Err(SentinelError::Cancelled),
                    ev = events.recv() => match ev {
                        Some(ev) => ev,
                        None => return Err(SentinelError::ChannelClosed("watcher events")),
                    },
                    err = errors.recv() => match err {
                        Some(msg) => return Err(SentinelError::Notifier(msg)),
                        None => return Err(SentinelError::ChannelClosed("watcher errors")),
                    },
                }
            };

            let Some(event) = self.process_raw(raw)? else {
                continue;
            };

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(SentinelError::Cancelled),
                sent = out.send(event) => {
                    if sent.is_err() {
                        return Err(SentinelError::ChannelClosed("file events"));
                    }
                }
            }
        }
    }

    fn process_raw(&mut self, raw: RawEvent) -> Result<Option<FileEvent>> {
        let Some(root) = self
            .containing_root(&raw.path)
            .map(|t| t.match_root().to_path_buf())
        else {
            trace!(path = %raw.path.display(), "event outside tracked paths");
            return Ok(None);
        };

        if matches_relative(&self.ignore, Some(&root), &raw.path) {
            debug!(path = %raw.path.display(), "ignored");
            return Ok(None);
        }

        if !raw.kind.is_content_change() {
            trace!(path = %raw.path.display(), kind = %raw.kind, "not a content change");
            return Ok(None);
        }

        match self.fs.metadata(&raw.path) {
            Err(err) => {
                // Typically the file vanished between the event and the stat.
                debug!(path = %raw.path.display(), error = %err, "dropping event");
                Ok(None)
            }
            Ok(EntryKind::Dir) => {
                if raw.kind == FileEventKind::Create {
                    info!(dir = %raw.path.display(), "new directory, extending watch");
                    self.register_tree(&root, &raw.path)?;
                }
                Ok(None)
            }
            Ok(EntryKind::File) => {
                let is_test = matches_relative(&self.tests, Some(&root), &raw.path);
                debug!(path = %raw.path.display(), kind = %raw.kind, is_test, "file event");
                Ok(Some(FileEvent {
                    path: raw.path,
                    kind: raw.kind,
                    timestamp: self.clock.now(),
                    is_test,
                }))
            }
        }
    }

    /// Longest tracked path that is `path` or an ancestor of it.
    fn containing_root(&self, path: &Path) -> Option<&TrackedPath> {
        self.tracked
            .iter()
            .filter(|t| path.starts_with(&t.path))
            .max_by_key(|t| t.path.components().count())
    }

    fn register_tree(&mut self, root: &Path, dir: &Path) -> Result<()> {
        let dirs = {
            let ignore = &self.ignore;
            walk_dirs(&*self.fs, dir, |d| matches_relative(ignore, Some(root), d)).map_err(
                |e| SentinelError::Filesystem(e.context(format!("failed to walk {:?}", dir))),
            )?
        };
        let mut added: Vec<PathBuf> = Vec::new();
        for d in dirs {
            if self.registered.contains(&d) {
                continue;
            }
            if let Err(err) = self.register_dir(&d) {
                // Leave no half-registered tree behind.
                for done in added.iter().rev() {
                    if let Err(e) = self.notifier.remove(done) {
                        warn!(
                            dir = %done.display(),
                            error = %e,
                            "failed to roll back registration"
                        );
                    }
                    self.registered.remove(done);
                }
                return Err(err);
            }
            added.push(d);
        }
        Ok(())
    }

    fn register_dir(&mut self, dir: &Path) -> Result<()> {
        if self.registered.contains(dir) {
            return Ok(());
        }
        self.notifier.add(dir)?;
        self.registered.insert(dir.to_path_buf());
        Ok(())
    }

    fn untrack(&mut self, abs: &Path) -> Result<()> {
        let before = self.tracked.len();
        self.tracked.retain(|t| t.path != abs);
        if self.tracked.len() == before {
            debug!(path = %abs.display(), "path was not tracked");
            return Ok(());
        }

        let unneeded: Vec<PathBuf> = self
            .registered
            .iter()
            .filter(|d| !self.tracked.iter().any(|t| needs_dir(t, d)))
            .cloned()
            .collect();
        for dir in unneeded {
            self.notifier.remove(&dir)?;
            self.registered.remove(&dir);
        }
        info!(path = %abs.display(), "stopped tracking");
        Ok(())
    }
}

fn build_matcher(patterns: &[String]) -> Result<PatternMatcher> {
    let mut matcher = PatternMatcher::new();
    for p in patterns {
        matcher.add_pattern(FilePattern::new(p.as_str()))?;
    }
    Ok(matcher)
}

fn needs_dir(tracked: &TrackedPath, dir: &Path) -> bool {
    if tracked.is_dir {
        dir.starts_with(&tracked.path)
    } else {
        tracked.path.parent() == Some(dir)
    }
}

/// Match against the path relative to `root`, or the full path when there is
/// no root. The root itself never matches.
fn matches_relative(matcher: &PatternMatcher, root: Option<&Path>, path: &Path) -> bool {
    let candidate = match root.and_then(|r| relative_str(r, path)) {
        Some(rel) if rel.is_empty() => return false,
        Some(rel) => rel,
        None => slash_str(path),
    };
    matcher.matches_registered(&candidate)
}
