// src/watch/notifier.rs

//! Narrow seam over the OS change-notification facility.
//!
//! Directories are always registered non-recursively. The watcher extends
//! coverage itself when a new directory appears, so behaviour does not depend
//! on whether a platform supports recursive watches.

use std::fmt::Debug;
use std::path::Path;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{Result, SentinelError};
use crate::types::FileEventKind;
use crate::watch::event::RawEvent;

pub type RawEventReceiver = mpsc::UnboundedReceiver<RawEvent>;
pub type NotifierErrorReceiver = mpsc::UnboundedReceiver<String>;

pub trait Notifier: Send + Debug {
    /// Start watching a single directory (non-recursively).
    fn add(&mut self, dir: &Path) -> Result<()>;
    fn remove(&mut self, dir: &Path) -> Result<()>;

    /// The event and error streams. Both close once the notifier is closed.
    fn channels(&mut self) -> (&mut RawEventReceiver, &mut NotifierErrorReceiver);

    /// Release native resources. Calling this more than once is harmless.
    fn close(&mut self) -> Result<()>;
}

/// Creates the notifier a watcher drives.
pub trait NotifierFactory: Send + Sync + Debug {
    fn create(&self) -> Result<Box<dyn Notifier>>;
}

/// Production notifier backed by `notify::RecommendedWatcher`.
pub struct NotifyNotifier {
    inner: Option<RecommendedWatcher>,
    events: RawEventReceiver,
    errors: NotifierErrorReceiver,
}

impl Debug for NotifyNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyNotifier")
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl NotifyNotifier {
    pub fn new() -> Result<Self> {
        // Channels from the blocking notify callback into the async world.
        let (event_tx, events) = mpsc::unbounded_channel::<RawEvent>();
        let (error_tx, errors) = mpsc::unbounded_channel::<String>();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for raw in raw_events(event) {
                        // The receiver only disappears during shutdown.
                        let _ = event_tx.send(raw);
                    }
                }
                Err(err) => {
                    let _ = error_tx.send(err.to_string());
                }
            },
            Config::default(),
        )
        .map_err(|e| SentinelError::Notifier(format!("failed to create file watcher: {e}")))?;

        Ok(Self {
            inner: Some(watcher),
            events,
            errors,
        })
    }
}

impl Notifier for NotifyNotifier {
    fn add(&mut self, dir: &Path) -> Result<()> {
        let watcher = self
            .inner
            .as_mut()
            .ok_or(SentinelError::ChannelClosed("notifier"))?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| SentinelError::Notifier(format!("failed to watch {:?}: {e}", dir)))?;
        debug!(dir = %dir.display(), "registered directory");
        Ok(())
    }

    fn remove(&mut self, dir: &Path) -> Result<()> {
        let watcher = self
            .inner
            .as_mut()
            .ok_or(SentinelError::ChannelClosed("notifier"))?;
        watcher
            .unwatch(dir)
            .map_err(|e| SentinelError::Notifier(format!("failed to unwatch {:?}: {e}", dir)))
    }

    fn channels(&mut self) -> (&mut RawEventReceiver, &mut NotifierErrorReceiver) {
        (&mut self.events, &mut self.errors)
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the watcher drops the callback, which closes both channels.
        if self.inner.take().is_some() {
            debug!("native notifier closed");
        }
        Ok(())
    }
}

/// Split one native event into per-path raw events.
///
/// A paired rename (`[from, to]`) reports the source as a rename and the
/// destination as a creation, so a file moved over another one still counts
/// as new content at its path.
pub fn raw_events(event: Event) -> Vec<RawEvent> {
    let kind = FileEventKind::from(&event.kind);
    let paired = matches!(
        event.kind,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both))
    );

    let mut out = Vec::with_capacity(event.paths.len());
    for (i, path) in event.paths.into_iter().enumerate() {
        let kind = if paired && i > 0 {
            FileEventKind::Create
        } else {
            kind
        };
        out.push(RawEvent { path, kind });
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct NotifyNotifierFactory;

impl NotifierFactory for NotifyNotifierFactory {
    fn create(&self) -> Result<Box<dyn Notifier>> {
        Ok(Box::new(NotifyNotifier::new()?))
    }
}
