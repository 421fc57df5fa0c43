// tests/coordinator_flow.rs

use std::error::Error;
use std::time::Duration;

use sentinel::engine::{CoordinatorState, WatchCoordinator};
use sentinel::errors::{Result as SentinelResult, SentinelError};
use sentinel::fs::mock::MockFileSystem;
use sentinel::results::OutputSink;
use sentinel::types::{FileEventKind, WatchMode};
use sentinel::watch::mock::{MockNotifierFactory, MockNotifierHandle};
use sentinel_test_utils::{
    FakeRunner, RecordingProcessor, WatchOptionsBuilder, eventually, init_tracing, mock_deps,
    with_timeout,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

fn project() -> MockFileSystem {
    let fs = MockFileSystem::with_cwd("/proj");
    fs.add_file("pkg/a.go", "package pkg\n");
    fs.add_file(
        "pkg/a_test.go",
        "package pkg\n\nfunc TestA(t *testing.T) {}\n",
    );
    fs.add_file("util/u.go", "package util\n");
    fs.add_file("util/u_test.go", "package util\n\nfunc TestU(t *testing.T) {}\n");
    fs.add_file("vendor/lib/lib.go", "package lib\n");
    fs.add_file("vendor/lib/lib_test.go", "package lib\n");
    fs
}

struct Harness {
    fs: MockFileSystem,
    notifier: MockNotifierHandle,
    runner: FakeRunner,
    processor: RecordingProcessor,
    ctx: CancellationToken,
}

impl Harness {
    fn new(runner: FakeRunner) -> Self {
        init_tracing();
        Self {
            fs: project(),
            notifier: MockNotifierHandle::default(),
            runner,
            processor: RecordingProcessor::new(),
            ctx: CancellationToken::new(),
        }
    }

    fn build(&mut self, options: WatchOptionsBuilder) -> WatchCoordinator {
        let notifiers = MockNotifierFactory::new();
        self.notifier = notifiers.handle();
        WatchCoordinator::builder(options.build())
            .with_watcher_deps(mock_deps(&self.fs, &notifiers))
            .with_runner(self.runner.clone())
            .with_processor(self.processor.clone())
            .build()
            .unwrap()
    }

    /// Start watching in the background and wait until the tree is registered.
    async fn start(
        &self,
        mut coordinator: WatchCoordinator,
    ) -> JoinHandle<(WatchCoordinator, SentinelResult<()>)> {
        let ctx = self.ctx.clone();
        let task = tokio::spawn(async move {
            let res = coordinator.start(ctx).await;
            (coordinator, res)
        });
        let handle = self.notifier.clone();
        eventually(move || handle.is_watched("/proj/pkg")).await;
        task
    }

    fn emit(&self, path: &str) {
        assert!(self.notifier.emit(path, FileEventKind::Write));
    }
}

fn targets(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn changed_mode_runs_the_package_once_and_skips_vendor() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    let coordinator = h.build(WatchOptionsBuilder::new().with_mode(WatchMode::Changed));
    let task = h.start(coordinator).await;

    h.emit("/proj/pkg/a.go");
    h.emit("/proj/pkg/a_test.go");
    h.emit("/proj/vendor/lib/lib.go");

    let runner = h.runner.clone();
    eventually(move || runner.call_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(h.runner.calls(), vec![targets(&["pkg"])]);

    h.ctx.cancel();
    let (coordinator, res) = with_timeout(task).await?;
    assert!(matches!(res, Err(SentinelError::Cancelled)));

    let status = coordinator.status();
    assert_eq!(status.state, CoordinatorState::Stopped);
    assert_eq!(status.event_count, 2);
    assert_eq!(status.run_count, 1);
    assert_eq!(h.processor.renders(), vec![true]);
    assert!(
        coordinator
            .cache()
            .get_cached_result("/proj/pkg/a.go")
            .is_some()
    );
    Ok(())
}

#[tokio::test]
async fn all_mode_runs_every_package() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    let coordinator = h.build(WatchOptionsBuilder::new().with_mode(WatchMode::All));
    let task = h.start(coordinator).await;

    h.emit("/proj/util/u.go");
    let runner = h.runner.clone();
    eventually(move || runner.call_count() == 1).await;
    assert_eq!(h.runner.calls(), vec![targets(&["pkg", "util"])]);

    h.ctx.cancel();
    with_timeout(task).await?;
    Ok(())
}

#[tokio::test]
async fn test_patterns_decide_which_packages_run() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    h.fs.add_file("web/a.ts", "export const a = 1;\n");
    h.fs.add_file("web/a.spec.ts", "it('a', () => {});\n");
    let coordinator = h.build(
        WatchOptionsBuilder::new()
            .with_mode(WatchMode::All)
            .with_test_patterns(&["*.spec.ts"]),
    );
    let task = h.start(coordinator).await;

    h.emit("/proj/web/a.ts");
    let runner = h.runner.clone();
    eventually(move || runner.call_count() == 1).await;
    assert_eq!(h.runner.calls(), vec![targets(&["web"])]);

    h.ctx.cancel();
    with_timeout(task).await?;
    Ok(())
}

#[tokio::test]
async fn related_mode_pairs_across_one_batch() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    let coordinator = h.build(WatchOptionsBuilder::new().with_mode(WatchMode::Related));
    let task = h.start(coordinator).await;

    h.emit("/proj/pkg/a_test.go");
    h.emit("/proj/pkg/a.go");
    h.emit("/proj/util/u.go");

    let runner = h.runner.clone();
    eventually(move || runner.call_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(h.runner.calls(), vec![targets(&["pkg", "util"])]);

    h.ctx.cancel();
    let (coordinator, _) = with_timeout(task).await?;
    let status = coordinator.status();
    assert_eq!(status.event_count, 3);
    assert_eq!(status.run_count, 1);
    Ok(())
}

#[tokio::test]
async fn at_most_one_run_in_flight() -> TestResult {
    let mut h = Harness::new(FakeRunner::gated());
    let coordinator = h.build(WatchOptionsBuilder::new());
    let task = h.start(coordinator).await;

    h.emit("/proj/pkg/a.go");
    let runner = h.runner.clone();
    eventually(move || runner.active() == 1).await;

    // Changes during the run queue up for the next window.
    h.emit("/proj/util/u.go");
    h.emit("/proj/util/u_test.go");
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(h.runner.call_count(), 1);

    h.runner.release(1);
    let runner = h.runner.clone();
    eventually(move || runner.call_count() == 2).await;
    h.runner.release(1);
    let runner = h.runner.clone();
    eventually(move || runner.active() == 0).await;

    assert_eq!(h.runner.max_active(), 1);
    assert_eq!(h.runner.calls()[1], targets(&["util"]));

    h.ctx.cancel();
    with_timeout(task).await?;
    Ok(())
}

#[tokio::test]
async fn cancel_during_debounce_skips_the_run() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    let coordinator = h.build(WatchOptionsBuilder::new().with_debounce_ms(10_000));
    let task = h.start(coordinator).await;

    h.emit("/proj/pkg/a.go");
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.ctx.cancel();

    let (_, res) = with_timeout(task).await?;
    assert!(matches!(res, Err(SentinelError::Cancelled)));
    assert_eq!(h.runner.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn cancel_during_run_abandons_it() -> TestResult {
    let mut h = Harness::new(FakeRunner::gated());
    let coordinator = h.build(WatchOptionsBuilder::new());
    let task = h.start(coordinator).await;

    h.emit("/proj/pkg/a.go");
    let runner = h.runner.clone();
    eventually(move || runner.active() == 1).await;
    h.ctx.cancel();

    let (coordinator, res) = with_timeout(task).await?;
    assert!(matches!(res, Err(SentinelError::Cancelled)));
    assert_eq!(h.runner.active(), 0);
    assert_eq!(h.runner.cancelled(), 1);
    assert!(h.processor.renders().is_empty());
    assert_eq!(coordinator.status().error_count, 0);
    Ok(())
}

#[tokio::test]
async fn stop_handle_ends_watching_for_good() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    let coordinator = h.build(WatchOptionsBuilder::new());
    let stop = coordinator.stop_handle();
    let task = h.start(coordinator).await;

    stop.stop();
    let (mut coordinator, res) = with_timeout(task).await?;
    assert!(matches!(res, Err(SentinelError::Cancelled)));
    assert!(h.notifier.is_closed());
    assert!(!coordinator.status().is_running());

    let again = coordinator.start(CancellationToken::new()).await;
    assert!(matches!(again, Err(SentinelError::Config(_))));
    Ok(())
}

#[tokio::test]
async fn run_on_start_runs_discovered_packages() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    let coordinator = h.build(WatchOptionsBuilder::new().run_on_start(true));
    let task = h.start(coordinator).await;

    assert_eq!(h.runner.calls(), vec![targets(&["pkg", "util"])]);

    h.ctx.cancel();
    with_timeout(task).await?;
    Ok(())
}

#[tokio::test]
async fn runner_failures_are_reported_and_watching_continues() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    h.runner.fail_with("go: command not found");
    let options = WatchOptionsBuilder::new();
    let output = options.buffer();
    let coordinator = h.build(options);
    let task = h.start(coordinator).await;

    h.emit("/proj/pkg/a.go");
    let runner = h.runner.clone();
    eventually(move || runner.call_count() == 1).await;
    let out = output.clone();
    eventually(move || out.contents().contains("test run failed")).await;

    h.emit("/proj/util/u.go");
    let runner = h.runner.clone();
    eventually(move || runner.call_count() == 2).await;

    h.ctx.cancel();
    let (coordinator, res) = with_timeout(task).await?;
    assert!(matches!(res, Err(SentinelError::Cancelled)));
    assert!(output.contents().contains("command not found"));
    let status = coordinator.status();
    assert_eq!(status.run_count, 2);
    assert_eq!(status.error_count, 2);
    Ok(())
}

struct BrokenPipe;

impl std::io::Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn unwritable_output_does_not_stop_watching() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    h.runner.fail_with("exec failed");
    let coordinator =
        h.build(WatchOptionsBuilder::new().with_output(OutputSink::from_writer(BrokenPipe)));
    let task = h.start(coordinator).await;

    h.emit("/proj/pkg/a.go");
    let runner = h.runner.clone();
    eventually(move || runner.call_count() == 1).await;
    h.emit("/proj/util/u.go");
    let runner = h.runner.clone();
    eventually(move || runner.call_count() == 2).await;

    h.ctx.cancel();
    let (coordinator, res) = with_timeout(task).await?;
    assert!(matches!(res, Err(SentinelError::Cancelled)));
    assert_eq!(coordinator.status().error_count, 2);
    Ok(())
}

#[tokio::test]
async fn fail_fast_stops_on_runner_failure() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    h.runner.fail_with("exec failed");
    let coordinator = h.build(WatchOptionsBuilder::new().fail_fast(true));
    let task = h.start(coordinator).await;

    h.emit("/proj/pkg/a.go");
    let (_, res) = with_timeout(task).await?;
    assert!(matches!(res, Err(SentinelError::Runner(_))));
    Ok(())
}

#[tokio::test]
async fn unchanged_content_is_skipped_with_use_hash() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    let coordinator = h.build(WatchOptionsBuilder::new().use_hash(true));
    let task = h.start(coordinator).await;

    h.emit("/proj/pkg/a.go");
    let runner = h.runner.clone();
    eventually(move || runner.call_count() == 1).await;

    // Same bytes again: nothing to run.
    h.emit("/proj/pkg/a.go");
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(h.runner.call_count(), 1);

    h.fs.add_file("/proj/pkg/a.go", "package pkg\n\nvar x = 1\n");
    h.emit("/proj/pkg/a.go");
    let runner = h.runner.clone();
    eventually(move || runner.call_count() == 2).await;

    h.ctx.cancel();
    with_timeout(task).await?;
    Ok(())
}

#[tokio::test]
async fn closing_the_notifier_ends_the_watch() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    let coordinator = h.build(WatchOptionsBuilder::new());
    let task = h.start(coordinator).await;

    h.notifier.disconnect();
    let (_, res) = with_timeout(task).await?;
    assert!(matches!(res, Err(SentinelError::ChannelClosed(_))));
    Ok(())
}

#[tokio::test]
async fn execute_tests_dedups_targets() -> TestResult {
    let mut h = Harness::new(FakeRunner::new().with_output("not json\n"));
    let mut coordinator = h.build(WatchOptionsBuilder::new());

    coordinator
        .execute_tests(&targets(&["pkg", "util", "pkg"]))
        .await?;

    assert_eq!(h.runner.calls(), vec![targets(&["pkg", "util"])]);
    assert_eq!(h.processor.resets(), 1);
    assert_eq!(h.processor.lines(), vec!["not json".to_string()]);
    assert_eq!(coordinator.status().run_count, 1);
    Ok(())
}

#[tokio::test]
async fn configure_validates_before_swapping() -> TestResult {
    let mut h = Harness::new(FakeRunner::new());
    let mut coordinator = h.build(WatchOptionsBuilder::new());

    let bad = WatchOptionsBuilder::new()
        .with_mode(WatchMode::Related)
        .with_debounce_ms(0)
        .build();
    assert!(matches!(
        coordinator.configure(bad),
        Err(SentinelError::Config(_))
    ));
    assert_eq!(coordinator.status().mode, WatchMode::Changed);

    let good = WatchOptionsBuilder::new()
        .with_paths(&["pkg"])
        .with_mode(WatchMode::Related)
        .build();
    coordinator.configure(good)?;
    let status = coordinator.status();
    assert_eq!(status.mode, WatchMode::Related);
    assert_eq!(status.watched_paths, vec!["pkg".to_string()]);
    assert_eq!(coordinator.root(), std::path::Path::new("/proj/pkg"));
    Ok(())
}
