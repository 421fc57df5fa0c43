use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sentinel::errors::{Result, SentinelError};
use sentinel::exec::{BoxFuture, TestRunner};
use sentinel::results::{OutputSink, ResultProcessor, RunStats, TestSuite};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// A fake test runner that:
/// - records the targets of every call
/// - tracks how many calls are in flight at once
/// - returns canned output, or a canned error
/// - optionally blocks each call until [`release`](Self::release) is called
///
/// Clones share state, so keep one clone for assertions and hand another to
/// the coordinator.
#[derive(Clone, Default)]
pub struct FakeRunner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
    output: Arc<Mutex<String>>,
    error: Arc<Mutex<Option<String>>>,
    gate: Option<Arc<Semaphore>>,
}

impl fmt::Debug for FakeRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeRunner")
            .field("calls", &self.calls())
            .field("active", &self.active())
            .finish_non_exhaustive()
    }
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits for a permit from [`release`](Self::release).
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn with_output(self, output: impl Into<String>) -> Self {
        *self.output.lock().unwrap() = output.into();
        self
    }

    /// Make every call fail with a runner error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.error.lock().unwrap() = Some(message.into());
    }

    /// Let `n` blocked (or future) calls finish.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were ever in flight together.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Calls that ended because their context was cancelled or their future
    /// was dropped.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count however the call ends.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
    finished: bool,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        if !self.finished {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl TestRunner for FakeRunner {
    fn run<'a>(
        &'a mut self,
        ctx: CancellationToken,
        targets: &'a [String],
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(targets.to_vec());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            let mut guard = ActiveGuard {
                active: Arc::clone(&self.active),
                cancelled: Arc::clone(&self.cancelled),
                finished: false,
            };

            if let Some(gate) = self.gate.clone() {
                tokio::select! {
                    _ = ctx.cancelled() => return Err(SentinelError::Cancelled),
                    permit = gate.acquire() => match permit {
                        Ok(p) => p.forget(),
                        Err(_) => return Err(SentinelError::Cancelled),
                    },
                }
            } else if ctx.is_cancelled() {
                return Err(SentinelError::Cancelled);
            }

            guard.finished = true;
            if let Some(msg) = self.error.lock().unwrap().clone() {
                return Err(SentinelError::Runner(anyhow::anyhow!(msg)));
            }
            Ok(self.output.lock().unwrap().clone())
        })
    }
}

/// A result processor that only remembers what it was fed.
#[derive(Debug, Clone, Default)]
pub struct RecordingProcessor {
    lines: Arc<Mutex<Vec<String>>>,
    resets: Arc<AtomicUsize>,
    renders: Arc<Mutex<Vec<bool>>>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// The `finalize` flag of each render, in order.
    pub fn renders(&self) -> Vec<bool> {
        self.renders.lock().unwrap().clone()
    }
}

impl ResultProcessor for RecordingProcessor {
    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn process_line(&mut self, line: &str) -> Result<()> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }

    fn suites(&self) -> Vec<TestSuite> {
        Vec::new()
    }

    fn stats(&self) -> RunStats {
        RunStats::default()
    }

    fn render_results(&mut self, finalize: bool) -> Result<()> {
        self.renders.lock().unwrap().push(finalize);
        Ok(())
    }

    fn set_output(&mut self, _sink: OutputSink) {}
}
