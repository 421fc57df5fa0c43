// src/engine/mod.rs

//! Orchestration engine.
//!
//! The pure pieces live in [`debounce`] (the coalescing window) and
//! [`targets`] (file → package mapping); the async shell that owns the
//! watcher, runner, processor and cache is [`coordinator`].

pub mod coordinator;
pub mod debounce;
pub mod options;
pub mod targets;

pub use coordinator::{
    CoordinatorBuilder, CoordinatorState, EVENT_BUFFER, StopHandle, WatchCoordinator, WatchStatus,
};
pub use debounce::Debouncer;
pub use options::{DEFAULT_DEBOUNCE, DEFAULT_IGNORE_PATTERNS, DEFAULT_TEST_PATTERNS, WatchOptions};
pub use targets::{TargetSet, relative_target};
