// src/engine/debounce.rs

//! Pure debounce window: coalesces events by path until the window settles.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

use crate::watch::FileEvent;

#[derive(Debug)]
pub struct Debouncer {
    interval: Duration,
    pending: Vec<FileEvent>,
    index: HashMap<PathBuf, usize>,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: Vec::new(),
            index: HashMap::new(),
            deadline: None,
        }
    }

    /// Add an event and re-arm the window. A repeated path keeps its first
    /// position but carries the latest event.
    pub fn push(&mut self, event: FileEvent, now: Instant) {
        match self.index.get(&event.path) {
            Some(&i) => self.pending[i] = event,
            None => {
                self.index.insert(event.path.clone(), self.pending.len());
                self.pending.push(event);
            }
        }
        self.deadline = Some(now + self.interval);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drain the settled batch in first-arrival order and disarm.
    pub fn take(&mut self) -> Vec<FileEvent> {
        self.index.clear();
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileEventKind;
    use chrono::Utc;

    fn ev(path: &str, kind: FileEventKind) -> FileEvent {
        FileEvent {
            path: PathBuf::from(path),
            kind,
            timestamp: Utc::now(),
            is_test: false,
        }
    }

    #[test]
    fn coalesces_by_path_in_arrival_order() {
        let mut d = Debouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();
        d.push(ev("/p/b.go", FileEventKind::Create), t0);
        d.push(ev("/p/a.go", FileEventKind::Write), t0);
        d.push(ev("/p/b.go", FileEventKind::Write), t0 + Duration::from_millis(40));

        assert_eq!(d.deadline(), Some(t0 + Duration::from_millis(140)));

        let batch = d.take();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].path, PathBuf::from("/p/b.go"));
        assert_eq!(batch[0].kind, FileEventKind::Write);
        assert_eq!(batch[1].path, PathBuf::from("/p/a.go"));
        assert!(d.deadline().is_none());
        assert!(!d.is_pending());
    }
}
