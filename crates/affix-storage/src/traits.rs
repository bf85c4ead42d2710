//! Storage abstraction trait
//!
//! This module defines the key-based Storage trait that byte backends implement.

use affix_core::{AttachmentError, StoreKind};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Attribute this error to the named store.
    pub fn into_attachment_error(self, store: &str) -> AttachmentError {
        match self {
            StorageError::ConfigError(message) => {
                AttachmentError::Configuration(format!("store `{}`: {}", store, message))
            }
            StorageError::InvalidKey(key) => AttachmentError::InvalidKey(key),
            other => AttachmentError::store(store, other),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// Byte backends (local filesystem, object stores) implement this trait. Attachment stores
/// compute keys and delegate the actual reads and writes here.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` at `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Read the object at `key`.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Delete the object at `key`. Missing objects return `NotFound`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Move the object at `from` to `to`.
    ///
    /// Backends without a native rename copy then delete, so the old object may briefly
    /// coexist with the new one.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Publicly reachable URL for `key`, if the backend serves files directly.
    fn url(&self, key: &str) -> Option<String>;

    /// Get the storage backend kind
    fn kind(&self) -> StoreKind;
}
