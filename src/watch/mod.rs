// src/watch/mod.rs

//! File watching: native notification behind a seam, glob filtering, and
//! filename-convention test pairing.

pub mod clock;
pub mod event;
pub mod finder;
pub mod mock;
pub mod notifier;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use clock::{Clock, FixedClock, SystemClock};
pub use event::{FileEvent, RawEvent};
pub use finder::TestFileFinder;
pub use notifier::{Notifier, NotifierFactory, NotifyNotifier, NotifyNotifierFactory};
pub use patterns::{FilePattern, PatternMatcher};
pub use watcher::{FileSystemWatcher, WatcherDeps};
