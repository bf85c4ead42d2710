//! Error types module
//!
//! All attachment operations report failures through [`AttachmentError`]. Task failures are
//! captured as [`TaskFailure`] values so they can be recorded in a record's task progress.

use serde::{Deserialize, Serialize};
use std::io;

/// Opaque failure raised by a task while running against an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("task `{task}` failed: {message}")]
pub struct TaskFailure {
    pub task: String,
    pub message: String,
}

impl TaskFailure {
    pub fn new(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Capture an arbitrary task error, keeping its full context chain in the message.
    pub fn capture(task: impl Into<String>, error: &anyhow::Error) -> Self {
        Self::new(task, format!("{:#}", error))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Task(#[from] TaskFailure),

    #[error("Store `{store}` failed: {message}")]
    Store { store: String, message: String },

    #[error("Every target store failed to save attachment {id}")]
    AllStoresFailed { id: i64 },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Image processing error: {0}")]
    Image(String),

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl AttachmentError {
    pub fn store(store: impl Into<String>, error: impl std::fmt::Display) -> Self {
        AttachmentError::Store {
            store: store.into(),
            message: error.to_string(),
        }
    }

    /// Configuration and key errors are programmer errors and never recovered.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AttachmentError::Configuration(_) | AttachmentError::InvalidKey(_)
        )
    }
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;
