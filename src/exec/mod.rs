// src/exec/mod.rs

//! Test execution backends.

pub mod runner;

pub use runner::{BoxFuture, CommandRunner, TestRunner};
