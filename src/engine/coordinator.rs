// src/engine/coordinator.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::TestResultCache;
use crate::engine::debounce::Debouncer;
use crate::engine::options::WatchOptions;
use crate::engine::targets::{TargetSet, dirs_for_change, discover_packages, relative_target};
use crate::errors::{Result, SentinelError};
use crate::exec::{CommandRunner, TestRunner};
use crate::fs::{EntryKind, FileSystem};
use crate::results::{JsonResultProcessor, ResultProcessor, TestSuite};
use crate::types::WatchMode;
use crate::watch::patterns::{FilePattern, PatternMatcher};
use crate::watch::{Clock, FileEvent, FileSystemWatcher, TestFileFinder, WatcherDeps};

/// Capacity of the watcher → coordinator event channel.
pub const EVENT_BUFFER: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Stopped,
    Idle,
    Debouncing,
    Running,
}

/// Snapshot of what the coordinator is doing.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchStatus {
    pub state: CoordinatorState,
    pub mode: WatchMode,
    pub watched_paths: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub event_count: u64,
    pub run_count: u64,
    pub error_count: u64,
}

impl WatchStatus {
    pub fn is_running(&self) -> bool {
        self.state != CoordinatorState::Stopped
    }
}

/// Requests shutdown of a running coordinator from another task.
#[derive(Debug, Clone)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    pub fn stop(&self) {
        self.0.cancel();
    }
}

pub struct CoordinatorBuilder {
    options: WatchOptions,
    deps: WatcherDeps,
    runner: Option<Box<dyn TestRunner>>,
    processor: Option<Box<dyn ResultProcessor>>,
}

impl CoordinatorBuilder {
    pub fn new(options: WatchOptions) -> Self {
        Self {
            options,
            deps: WatcherDeps::default(),
            runner: None,
            processor: None,
        }
    }

    pub fn with_runner(mut self, runner: impl TestRunner + 'static) -> Self {
        self.runner = Some(Box::new(runner));
        self
    }

    pub fn with_processor(mut self, processor: impl ResultProcessor + 'static) -> Self {
        self.processor = Some(Box::new(processor));
        self
    }

    pub fn with_watcher_deps(mut self, deps: WatcherDeps) -> Self {
        self.deps = deps;
        self
    }

    pub fn build(self) -> Result<WatchCoordinator> {
        let mut options = self.options;
        options.validate()?;
        options.paths = options.effective_paths();

        let fs = Arc::clone(&self.deps.fs);
        let clock = Arc::clone(&self.deps.clock);
        let root = resolve_root(&*fs, &options.paths)?;
        let ignore = pattern_matcher(&options.ignore_patterns)?;
        let finder = TestFileFinder::new(Arc::clone(&fs))
            .with_test_patterns(root.clone(), pattern_matcher(&options.test_patterns)?);
        let mut cache = TestResultCache::new(Arc::clone(&fs), Arc::clone(&clock));
        cache.set_finder(finder.clone());

        let watcher = FileSystemWatcher::new(
            options.paths.clone(),
            &options.ignore_patterns,
            &options.test_patterns,
            self.deps,
        )?;

        let runner = match self.runner {
            Some(r) => r,
            None => Box::new(CommandRunner::default().with_workdir(root.clone())),
        };
        let processor = match self.processor {
            Some(p) => p,
            None => Box::new(JsonResultProcessor::new(options.output.clone(), options.color)),
        };

        info!(root = %root.display(), mode = %options.mode, "coordinator configured");

        Ok(WatchCoordinator {
            status: WatchStatus {
                state: CoordinatorState::Stopped,
                mode: options.mode,
                watched_paths: options.paths.clone(),
                started_at: None,
                last_event_at: None,
                event_count: 0,
                run_count: 0,
                error_count: 0,
            },
            finder,
            cache,
            options,
            root,
            watcher: Some(watcher),
            runner,
            processor,
            ignore,
            fs,
            clock,
            shutdown: CancellationToken::new(),
        })
    }
}

/// Turns file events into debounced, at-most-one-at-a-time test runs.
///
/// The loop moves `Idle → Debouncing → Running → Idle`. Every event re-arms
/// the debounce window; when the window settles, targets are chosen by
/// [`WatchMode`] and handed to the runner. Events that arrive during a run
/// wait in the channel and open the next window.
pub struct WatchCoordinator {
    options: WatchOptions,
    root: PathBuf,
    /// `None` while the watcher is lent to its task, or after `stop`.
    watcher: Option<FileSystemWatcher>,
    runner: Box<dyn TestRunner>,
    processor: Box<dyn ResultProcessor>,
    finder: TestFileFinder,
    cache: TestResultCache,
    ignore: PatternMatcher,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    status: WatchStatus,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for WatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchCoordinator")
            .field("root", &self.root)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl WatchCoordinator {
    pub fn new(options: WatchOptions) -> Result<Self> {
        CoordinatorBuilder::new(options).build()
    }

    pub fn builder(options: WatchOptions) -> CoordinatorBuilder {
        CoordinatorBuilder::new(options)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    pub fn cache(&self) -> &TestResultCache {
        &self.cache
    }

    pub fn status(&self) -> WatchStatus {
        self.status.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.shutdown.clone())
    }

    /// Validate and swap in new options. On error the old ones stay active.
    pub fn configure(&mut self, options: WatchOptions) -> Result<()> {
        let mut options = options;
        options.validate()?;
        options.paths = options.effective_paths();
        let ignore = pattern_matcher(&options.ignore_patterns)?;
        let root = resolve_root(&*self.fs, &options.paths)?;
        let finder = TestFileFinder::new(Arc::clone(&self.fs))
            .with_test_patterns(root.clone(), pattern_matcher(&options.test_patterns)?);

        if let Some(watcher) = self.watcher.as_mut() {
            watcher.reconfigure(
                options.paths.clone(),
                &options.ignore_patterns,
                &options.test_patterns,
            )?;
        }
        self.processor.set_output(options.output.clone());

        info!(root = %root.display(), mode = %options.mode, "coordinator reconfigured");
        self.cache.set_finder(finder.clone());
        self.finder = finder;
        self.ignore = ignore;
        self.root = root;
        self.status.mode = options.mode;
        self.status.watched_paths = options.paths.clone();
        self.options = options;
        Ok(())
    }

    /// Watch until `ctx` is cancelled, [`stop`](Self::stop) is requested, or
    /// a fatal error occurs. Cancellation returns [`SentinelError::Cancelled`].
    pub async fn start(&mut self, ctx: CancellationToken) -> Result<()> {
        let mut watcher = self
            .watcher
            .take()
            .ok_or_else(|| SentinelError::config("coordinator is stopped or already running"))?;
        let run_ctx = self.shutdown.child_token();

        self.status.state = CoordinatorState::Idle;
        self.status.started_at = Some(self.clock.now());
        info!(paths = ?self.options.paths, mode = %self.options.mode, "starting watch");

        if self.options.run_on_start {
            let targets = self.all_targets();
            let initial = match targets {
                Ok(targets) => self.run_targets(&ctx, &run_ctx, targets, Vec::new()).await,
                Err(err) => Err(err),
            };
            if let Err(err) = initial {
                self.watcher = Some(watcher);
                self.status.state = CoordinatorState::Stopped;
                return Err(err);
            }
        }

        let (tx, rx) = mpsc::channel::<FileEvent>(EVENT_BUFFER);
        let watch_ctx = run_ctx.clone();
        let handle = tokio::spawn(async move {
            let result = watcher.watch(watch_ctx, tx).await;
            (watcher, result)
        });

        let loop_result = self.event_loop(&ctx, &run_ctx, rx).await;
        run_ctx.cancel();

        let joined = handle.await;
        self.status.state = CoordinatorState::Stopped;
        let (mut watcher, watch_result) = joined
            .map_err(|e| SentinelError::Other(anyhow!("watcher task failed: {e}")))?;

        if self.shutdown.is_cancelled() {
            watcher.close()?;
        } else {
            self.watcher = Some(watcher);
        }

        match loop_result {
            // The event stream ended: the watcher's own result says why.
            Ok(()) => match watch_result {
                Ok(()) => Err(SentinelError::ChannelClosed("file events")),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Request shutdown and release the watcher.
    pub fn stop(&mut self) -> Result<()> {
        self.shutdown.cancel();
        self.status.state = CoordinatorState::Stopped;
        if let Some(mut watcher) = self.watcher.take() {
            watcher.close()?;
        }
        info!("coordinator stopped");
        Ok(())
    }

    /// Run the tests for `targets` once and publish the results.
    pub async fn execute_tests(&mut self, targets: &[String]) -> Result<()> {
        let mut set = TargetSet::new();
        set.extend(targets.iter().cloned());
        let targets = set.into_vec();
        let ctx = self.shutdown.child_token();
        self.execute_with(ctx, &targets, &[]).await
    }

    async fn event_loop(
        &mut self,
        ctx: &CancellationToken,
        run_ctx: &CancellationToken,
        mut rx: mpsc::Receiver<FileEvent>,
    ) -> Result<()> {
        let mut debouncer = Debouncer::new(self.options.debounce);

        loop {
            self.status.state = if debouncer.is_pending() {
                CoordinatorState::Debouncing
            } else {
                CoordinatorState::Idle
            };
            let deadline = debouncer.deadline();

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(SentinelError::Cancelled),
                _ = run_ctx.cancelled() => return Err(SentinelError::Cancelled),
                event = rx.recv() => match event {
                    Some(event) => {
                        self.status.event_count += 1;
                        self.status.last_event_at = Some(event.timestamp);
                        debug!(path = %event.path.display(), kind = %event.kind, "debouncing");
                        debouncer.push(event, Instant::now());
                    }
                    None => return Ok(()),
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let batch = debouncer.take();
                    let (targets, changed) = self.plan(batch);
                    self.run_targets(ctx, run_ctx, targets, changed).await?;
                }
            }
        }
    }

    /// Choose targets for a settled batch and collect the changed paths.
    fn plan(&mut self, batch: Vec<FileEvent>) -> (Vec<String>, Vec<String>) {
        let mut targets = TargetSet::new();
        let mut changed = Vec::with_capacity(batch.len());

        for event in batch {
            let path = event.path.to_string_lossy().into_owned();
            match self.cache.analyze_change(&path) {
                Ok(change) => {
                    if self.options.use_hash {
                        if let Some(hash) = change.content_hash.as_deref() {
                            if !self.cache.has_content_changed(&path, hash) {
                                debug!(path = %path, "content unchanged, skipping");
                                continue;
                            }
                        }
                    }
                    debug!(
                        path = %path,
                        change = ?change.change_type,
                        is_new = change.is_new,
                        affected = ?change.affected_tests,
                        "analyzed change"
                    );
                }
                Err(err) => debug!(path = %path, error = %err, "change analysis failed"),
            }

            for dir in dirs_for_change(self.options.mode, &self.finder, &event.path) {
                targets.insert(relative_target(&self.root, &dir));
            }
            changed.push(path);
        }

        if self.options.mode == WatchMode::All && !changed.is_empty() {
            match self.all_targets() {
                Ok(all) => targets.extend(all),
                Err(err) => {
                    warn!(error = %err, "package discovery failed, running root");
                    targets.insert(".");
                }
            }
        }

        (targets.into_vec(), changed)
    }

    /// Execute one cycle, honouring cancellation and the failure policy.
    async fn run_targets(
        &mut self,
        ctx: &CancellationToken,
        run_ctx: &CancellationToken,
        targets: Vec<String>,
        changed: Vec<String>,
    ) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        self.status.state = CoordinatorState::Running;

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(SentinelError::Cancelled),
            res = self.execute_with(run_ctx.clone(), &targets, &changed) => res,
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(SentinelError::Cancelled) => Err(SentinelError::Cancelled),
            Err(err) => {
                self.status.error_count += 1;
                warn!(error = %err, ?targets, "test run failed");
                if let Err(e) = self.options.output.write_line(&format!("test run failed: {err}")) {
                    warn!(error = %e, "failed to write to output sink");
                }
                if self.options.fail_fast {
                    Err(err)
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn execute_with(
        &mut self,
        ctx: CancellationToken,
        targets: &[String],
        changed: &[String],
    ) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        if self.options.clear_terminal {
            self.options.output.write_str("\x1b[2J\x1b[H")?;
        }

        info!(?targets, "running tests");
        self.status.run_count += 1;
        let output = self.runner.run(ctx, targets).await?;

        self.processor.reset();
        self.processor.process_output(&output)?;
        self.processor.render_results(true)?;

        let suites = self.processor.suites();
        let combined = TestSuite::merged(targets.join(" "), &suites);
        for path in changed {
            self.cache.cache_result(path.clone(), combined.clone());
        }
        Ok(())
    }

    fn all_targets(&self) -> Result<Vec<String>> {
        let roots: Vec<PathBuf> = self
            .options
            .paths
            .iter()
            .filter_map(|p| self.fs.absolute(Path::new(p)).ok())
            .collect();
        let packages = discover_packages(&*self.fs, &self.finder, &roots, &self.ignore)?;

        let mut set = TargetSet::new();
        set.extend(packages.iter().map(|d| relative_target(&self.root, d)));
        if set.is_empty() {
            set.insert(".");
        }
        Ok(set.into_vec())
    }
}

/// The first configured path, or its directory when it names a file.
pub(crate) fn resolve_root(fs: &dyn FileSystem, paths: &[String]) -> Result<PathBuf> {
    let first = paths.first().map(String::as_str).unwrap_or(".");
    let abs = fs.absolute(Path::new(first)).map_err(|e| {
        SentinelError::Filesystem(e.context(format!("failed to resolve root {first:?}")))
    })?;
    match fs.metadata(&abs) {
        Ok(EntryKind::File) => Ok(abs.parent().map(Path::to_path_buf).unwrap_or(abs)),
        _ => Ok(abs),
    }
}

fn pattern_matcher(patterns: &[String]) -> Result<PatternMatcher> {
    let mut matcher = PatternMatcher::new();
    for p in patterns {
        matcher.add_pattern(FilePattern::new(p.as_str()))?;
    }
    Ok(matcher)
}
