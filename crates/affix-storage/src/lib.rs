//! Affix Storage Library
//!
//! This crate provides the stores attachment bytes are persisted to and the delegator that
//! keeps a record's declared store set in sync with them.
//!
//! # Layers
//!
//! - [`Storage`]: key-based byte storage (local filesystem, object stores).
//! - [`AttachmentStore`]: one named store bound to an attachment type. It turns a record into
//!   a key (or a blob row reference) and reads, writes, renames and deletes its bytes.
//! - [`StorageDelegator`]: routes a record's operations to every store in its declared set and
//!   reconciles that set on save.
//!
//! # Storage key format
//!
//! Partitioned keys look like `{prefix}/0000/0042/{filename}`: the record id (the parent id
//! for thumbnails) is zero-padded to eight digits and split into groups of four. Flat keys are
//! `{prefix}/{id}/{filename}`. Keys must not contain `..` or a leading `/`.

pub mod binding;
pub mod blob;
pub mod delegator;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-remote")]
pub mod remote;
pub mod store;
pub mod traits;

// Re-export commonly used types
pub use affix_core::StoreKind;
pub use binding::{AccessPolicy, StoreBinding};
pub use blob::{BlobRepository, BlobStore, InMemoryBlobRepository};
pub use delegator::StorageDelegator;
pub use factory::{create_delegator, create_store};
pub use keys::KeyLayout;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-remote")]
pub use remote::RemoteStorage;
pub use store::{AttachmentStore, KeyedStore};
pub use traits::{Storage, StorageError, StorageResult};
