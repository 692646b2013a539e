//! Error types for the class watcher.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineError;
use crate::loader::LoadError;

/// Errors from watcher operations.
///
/// Only the setup variants (`InitFailed`, `RootUnavailable`, `PathWatchFailed`
/// on a root) ever stop the watcher from running. Everything else is logged at
/// the point of failure and the event loop moves on.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Watch root {path} is not accessible: {reason}")]
    RootUnavailable { path: PathBuf, reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Failed to find a watched folder for the directory: {dir}")]
    NoMatchingRoot { dir: PathBuf },

    #[error("Cannot derive a type name from {path}: {reason}")]
    InvalidTypeName { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Notify(#[from] EngineError),

    #[error("Failed to load config: {reason}")]
    ConfigError { reason: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,

    #[error("Watcher thread panicked")]
    ThreadPanicked,
}

impl WatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WatchError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
