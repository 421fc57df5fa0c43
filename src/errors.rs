// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    /// Invalid options: empty path, unsupported mode, bad glob, zero debounce.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stat / walk / read failures, with path and operation context.
    #[error("Filesystem error: {0:#}")]
    Filesystem(anyhow::Error),

    /// The native change notifier reported an error.
    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("{0} channel closed")]
    ChannelClosed(&'static str),

    #[error("Test execution failed: {0:#}")]
    Runner(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SentinelError {
    pub fn config(msg: impl Into<String>) -> Self {
        SentinelError::Config(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SentinelError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
