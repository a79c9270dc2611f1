//! Error types for the notifier.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from registry, watch source and configuration operations.
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Stale watch handle {handle}")]
    StaleHandle { handle: String },

    #[error("Failed to initialize watch source: {reason}")]
    InitFailed { reason: String },

    #[error("Watch source failed during {operation}: {source}")]
    Source {
        operation: &'static str,
        source: std::io::Error,
    },

    #[error("Unknown event kind: {0}")]
    UnknownEvent(String),

    #[error("Failed to load config: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Event channel closed unexpectedly")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NotifierError {
    pub(crate) fn source_failure(operation: &'static str, source: std::io::Error) -> Self {
        NotifierError::Source { operation, source }
    }

    /// True for errors caused by a path that is missing on disk.
    pub fn is_invalid_path(&self) -> bool {
        matches!(self, NotifierError::InvalidPath { .. })
    }

    /// True for watch source failures caused by missing read permission.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            NotifierError::Source { source, .. } | NotifierError::Io(source) => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}

pub type NotifierResult<T> = Result<T, NotifierError>;
