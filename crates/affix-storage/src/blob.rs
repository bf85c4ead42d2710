//! Database blob store: bytes live in a blob row referenced by the record's `db_file_id`.

use crate::binding::StoreBinding;
use crate::store::AttachmentStore;
use crate::traits::{StorageError, StorageResult};
use affix_core::AttachmentRecord;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Persistence for blob rows.
#[async_trait]
pub trait BlobRepository: Send + Sync {
    /// Write `data` into row `id`, or a new row when `id` is `None`. Returns the row id.
    async fn save(&self, id: Option<i64>, data: Bytes) -> StorageResult<i64>;

    async fn load(&self, id: i64) -> StorageResult<Bytes>;

    /// Missing rows return `NotFound`.
    async fn delete(&self, id: i64) -> StorageResult<()>;
}

/// Blob rows kept in process memory.
#[derive(Default)]
pub struct InMemoryBlobRepository {
    rows: Mutex<(i64, BTreeMap<i64, Bytes>)>,
}

impl InMemoryBlobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.1.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, (i64, BTreeMap<i64, Bytes>)>> {
        self.rows
            .lock()
            .map_err(|_| StorageError::BackendError("blob rows lock poisoned".to_string()))
    }
}

#[async_trait]
impl BlobRepository for InMemoryBlobRepository {
    async fn save(&self, id: Option<i64>, data: Bytes) -> StorageResult<i64> {
        let mut rows = self.lock()?;
        let id = match id {
            Some(id) => id,
            None => {
                rows.0 += 1;
                rows.0
            }
        };
        rows.1.insert(id, data);
        Ok(id)
    }

    async fn load(&self, id: i64) -> StorageResult<Bytes> {
        self.lock()?
            .1
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("db_file {}", id)))
    }

    async fn delete(&self, id: i64) -> StorageResult<()> {
        match self.lock()?.1.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(format!("db_file {}", id))),
        }
    }
}

/// Attachment store over a [`BlobRepository`]. It has no paths, so renames are no-ops.
pub struct BlobStore {
    binding: StoreBinding,
    repository: Arc<dyn BlobRepository>,
}

impl BlobStore {
    pub fn new(binding: StoreBinding, repository: Arc<dyn BlobRepository>) -> Self {
        Self {
            binding,
            repository,
        }
    }
}

#[async_trait]
impl AttachmentStore for BlobStore {
    fn binding(&self) -> &StoreBinding {
        &self.binding
    }

    fn full_filename(&self, _record: &AttachmentRecord) -> StorageResult<Option<String>> {
        Ok(None)
    }

    async fn current_data(&self, record: &AttachmentRecord) -> StorageResult<Bytes> {
        match record.db_file_id {
            Some(id) => self.repository.load(id).await,
            None => Err(StorageError::NotFound("attachment has no db_file".to_string())),
        }
    }

    async fn write_file(&self, record: &mut AttachmentRecord, data: Bytes) -> StorageResult<()> {
        let size = data.len();
        let id = self.repository.save(record.db_file_id, data).await?;
        record.db_file_id = Some(id);

        tracing::info!(
            store = %self.binding.name,
            db_file_id = id,
            size_bytes = size,
            "Blob write successful"
        );

        Ok(())
    }

    async fn destroy_file(&self, record: &AttachmentRecord) -> StorageResult<()> {
        let Some(id) = record.db_file_id else {
            return Ok(());
        };
        match self.repository.delete(id).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    async fn rename_file(
        &self,
        _record: &AttachmentRecord,
        _previous_filename: &str,
    ) -> StorageResult<()> {
        Ok(())
    }
}
