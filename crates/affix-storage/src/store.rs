//! Per-record store capability.

use crate::binding::StoreBinding;
use crate::keys::attachment_key;
use crate::traits::{Storage, StorageError, StorageResult};
use affix_core::{Attachment, AttachmentRecord, StoreKind};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// One named store bound to an attachment type.
///
/// Implementations must make `destroy_file` idempotent and treat a missing object as
/// already destroyed.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    fn binding(&self) -> &StoreBinding;

    fn name(&self) -> &str {
        &self.binding().name
    }

    fn kind(&self) -> StoreKind {
        self.binding().kind
    }

    /// Key of the record's bytes in this store, or `None` for stores without paths.
    fn full_filename(&self, record: &AttachmentRecord) -> StorageResult<Option<String>>;

    /// URL the record can be fetched from, when the store serves it directly.
    fn public_path(&self, _record: &AttachmentRecord) -> StorageResult<Option<String>> {
        Ok(None)
    }

    /// Read the record's stored bytes.
    async fn current_data(&self, record: &AttachmentRecord) -> StorageResult<Bytes>;

    /// Write `data` as the record's bytes, replacing any previous copy.
    async fn write_file(&self, record: &mut AttachmentRecord, data: Bytes) -> StorageResult<()>;

    /// Write the attachment's most recent pending bytes. Does nothing when no upload is pending.
    async fn save_to_storage(&self, attachment: &mut Attachment) -> StorageResult<()> {
        match attachment.temp_data().await? {
            Some(data) => self.write_file(&mut attachment.record, data).await,
            None => Ok(()),
        }
    }

    /// Delete the record's bytes from this store.
    async fn destroy_file(&self, record: &AttachmentRecord) -> StorageResult<()>;

    /// Move the copy stored under `previous_filename` to the record's current filename.
    async fn rename_file(
        &self,
        record: &AttachmentRecord,
        previous_filename: &str,
    ) -> StorageResult<()>;
}

/// Attachment store over a key-based [`Storage`] backend (filesystem or remote objects).
pub struct KeyedStore {
    binding: StoreBinding,
    prefix: String,
    storage: Arc<dyn Storage>,
}

impl KeyedStore {
    /// `default_prefix` is used when the binding has no `path_prefix`.
    pub fn new(binding: StoreBinding, storage: Arc<dyn Storage>, default_prefix: &str) -> Self {
        let prefix = binding
            .path_prefix
            .clone()
            .unwrap_or_else(|| default_prefix.to_string());
        Self {
            binding,
            prefix,
            storage,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn key_for(&self, record: &AttachmentRecord, filename: &str) -> StorageResult<String> {
        let id = record.path_id().ok_or_else(|| {
            StorageError::InvalidKey("attachment has no id to build a key from".to_string())
        })?;
        attachment_key(&self.prefix, self.binding.layout(), id, filename)
    }

    fn key(&self, record: &AttachmentRecord) -> StorageResult<String> {
        let filename = record
            .filename
            .as_deref()
            .ok_or_else(|| StorageError::InvalidKey("attachment has no filename".to_string()))?;
        self.key_for(record, filename)
    }
}

#[async_trait]
impl AttachmentStore for KeyedStore {
    fn binding(&self) -> &StoreBinding {
        &self.binding
    }

    fn full_filename(&self, record: &AttachmentRecord) -> StorageResult<Option<String>> {
        self.key(record).map(Some)
    }

    fn public_path(&self, record: &AttachmentRecord) -> StorageResult<Option<String>> {
        if self.binding.kind == StoreKind::Remote
            && self.binding.access != crate::binding::AccessPolicy::PublicRead
        {
            return Ok(None);
        }
        Ok(self.storage.url(&self.key(record)?))
    }

    async fn current_data(&self, record: &AttachmentRecord) -> StorageResult<Bytes> {
        let key = self.key(record)?;
        self.storage.get(&key).await
    }

    async fn write_file(&self, record: &mut AttachmentRecord, data: Bytes) -> StorageResult<()> {
        let key = self.key(record)?;
        self.storage.put(&key, data).await
    }

    async fn destroy_file(&self, record: &AttachmentRecord) -> StorageResult<()> {
        let key = self.key(record)?;
        match self.storage.delete(&key).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    async fn rename_file(
        &self,
        record: &AttachmentRecord,
        previous_filename: &str,
    ) -> StorageResult<()> {
        let from = self.key_for(record, previous_filename)?;
        let to = self.key(record)?;
        if from == to {
            return Ok(());
        }
        match self.storage.rename(&from, &to).await {
            // nothing stored under the old name yet
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}
