//! Affix Core Library
//!
//! This crate provides the attachment domain model, error types, configuration, and
//! validation shared by the storage, processing, and database crates.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod repository;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::AffixConfig;
pub use error::{AttachmentError, AttachmentResult, TaskFailure};
pub use models::{
    Attachment, AttachmentRecord, ProcessingState, Schema, StoreSet, TaskOutcome, TaskProgress,
    Upload, UploadSource,
};
pub use repository::{AttachmentRepository, InMemoryAttachmentRepository};
pub use storage_types::StoreKind;
pub use validation::{sanitize_filename, AttachmentRules, ValidationError};
