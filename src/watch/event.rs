// src/watch/event.rs

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::types::FileEventKind;

/// A raw change reported by the native notifier, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FileEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// One filtered, classified mutation forwarded to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Absolute path of the changed file.
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub timestamp: DateTime<Utc>,
    /// Whether the path matched a test pattern.
    pub is_test: bool,
}
