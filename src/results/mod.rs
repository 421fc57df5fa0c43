// src/results/mod.rs

//! Structured test results: the test2json model, the accumulating processor
//! and the sink summaries are written to.

pub mod model;
pub mod processor;
pub mod sink;

pub use model::{RunStats, TestEvent, TestResult, TestStatus, TestSuite};
pub use processor::{JsonResultProcessor, ResultProcessor};
pub use sink::{OutputSink, SharedBuffer};
