// src/watch/mock.rs

//! In-memory notifier for driving the watch loop from tests.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::errors::{Result, SentinelError};
use crate::types::FileEventKind;
use crate::watch::event::RawEvent;
use crate::watch::notifier::{Notifier, NotifierErrorReceiver, NotifierFactory, RawEventReceiver};

#[derive(Debug, Default)]
struct Shared {
    events_tx: Option<mpsc::UnboundedSender<RawEvent>>,
    errors_tx: Option<mpsc::UnboundedSender<String>>,
    watched: BTreeSet<PathBuf>,
    add_calls: Vec<PathBuf>,
    remove_calls: Vec<PathBuf>,
    failing: BTreeSet<PathBuf>,
    created: usize,
    closed: bool,
}

/// Test-side handle: inject events, inspect registrations.
#[derive(Debug, Clone, Default)]
pub struct MockNotifierHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MockNotifierHandle {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Deliver a raw event. Returns false once the notifier is closed.
    pub fn emit(&self, path: impl Into<PathBuf>, kind: FileEventKind) -> bool {
        match &self.lock().events_tx {
            Some(tx) => tx.send(RawEvent::new(path, kind)).is_ok(),
            None => false,
        }
    }

    pub fn emit_error(&self, message: impl Into<String>) -> bool {
        match &self.lock().errors_tx {
            Some(tx) => tx.send(message.into()).is_ok(),
            None => false,
        }
    }

    /// Close both native channels, as if the OS facility went away.
    pub fn disconnect(&self) {
        let mut shared = self.lock();
        shared.events_tx = None;
        shared.errors_tx = None;
    }

    /// Make registering `dir` fail.
    pub fn fail_on(&self, dir: impl Into<PathBuf>) {
        self.lock().failing.insert(dir.into());
    }

    /// Directories currently registered.
    pub fn watched(&self) -> Vec<PathBuf> {
        self.lock().watched.iter().cloned().collect()
    }

    pub fn is_watched(&self, dir: impl AsRef<Path>) -> bool {
        self.lock().watched.contains(dir.as_ref())
    }

    pub fn add_calls(&self) -> Vec<PathBuf> {
        self.lock().add_calls.clone()
    }

    pub fn remove_calls(&self) -> Vec<PathBuf> {
        self.lock().remove_calls.clone()
    }

    pub fn created(&self) -> usize {
        self.lock().created
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[derive(Debug)]
pub struct MockNotifier {
    handle: MockNotifierHandle,
    events: RawEventReceiver,
    errors: NotifierErrorReceiver,
}

impl Notifier for MockNotifier {
    fn add(&mut self, dir: &Path) -> Result<()> {
        let mut shared = self.handle.lock();
        if shared.closed {
            return Err(SentinelError::ChannelClosed("notifier"));
        }
        shared.add_calls.push(dir.to_path_buf());
        if shared.failing.contains(dir) {
            return Err(SentinelError::Notifier(format!("failed to watch {:?}", dir)));
        }
        shared.watched.insert(dir.to_path_buf());
        Ok(())
    }

    fn remove(&mut self, dir: &Path) -> Result<()> {
        let mut shared = self.handle.lock();
        shared.remove_calls.push(dir.to_path_buf());
        shared.watched.remove(dir);
        Ok(())
    }

    fn channels(&mut self) -> (&mut RawEventReceiver, &mut NotifierErrorReceiver) {
        (&mut self.events, &mut self.errors)
    }

    fn close(&mut self) -> Result<()> {
        let mut shared = self.handle.lock();
        shared.closed = true;
        shared.events_tx = None;
        shared.errors_tx = None;
        Ok(())
    }
}

/// Hands out [`MockNotifier`]s wired to one shared handle.
#[derive(Debug, Clone, Default)]
pub struct MockNotifierFactory {
    handle: MockNotifierHandle,
    fail_create: bool,
}

impl MockNotifierFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose `create` always fails.
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn handle(&self) -> MockNotifierHandle {
        self.handle.clone()
    }
}

impl NotifierFactory for MockNotifierFactory {
    fn create(&self) -> Result<Box<dyn Notifier>> {
        if self.fail_create {
            return Err(SentinelError::Notifier(
                "failed to create file watcher: mock failure".to_string(),
            ));
        }
        let (events_tx, events) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        {
            let mut shared = self.handle.lock();
            shared.events_tx = Some(events_tx);
            shared.errors_tx = Some(errors_tx);
            shared.created += 1;
            shared.closed = false;
        }
        Ok(Box::new(MockNotifier {
            handle: self.handle.clone(),
            events,
            errors,
        }))
    }
}
