//! Persistence seam for attachment rows.
//!
//! Hosts provide an [`AttachmentRepository`] per attachment type. The Postgres implementation
//! lives in `affix-db`; [`InMemoryAttachmentRepository`] backs tests and embedded use.

use crate::error::{AttachmentError, AttachmentResult};
use crate::models::{Attachment, AttachmentRecord, StoreSet};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    /// Insert a new row and return its id.
    async fn insert(&self, record: &AttachmentRecord) -> AttachmentResult<i64>;

    /// Write every column of an existing row.
    async fn update(&self, record: &AttachmentRecord) -> AttachmentResult<()>;

    /// Write only the `stores` column, bypassing any in-memory copy of the record.
    async fn update_stores(&self, id: i64, stores: &StoreSet) -> AttachmentResult<()>;

    /// Write only the `db_file_id` column.
    async fn update_blob_ref(&self, id: i64, db_file_id: Option<i64>) -> AttachmentResult<()>;

    async fn delete(&self, id: i64) -> AttachmentResult<()>;

    async fn find(&self, id: i64) -> AttachmentResult<Option<AttachmentRecord>>;

    /// All thumbnail rows whose `parent_id` is `parent_id`, ordered by id.
    async fn find_thumbnails(&self, parent_id: i64) -> AttachmentResult<Vec<AttachmentRecord>>;

    async fn find_thumbnail(
        &self,
        parent_id: i64,
        label: &str,
    ) -> AttachmentResult<Option<AttachmentRecord>> {
        Ok(self
            .find_thumbnails(parent_id)
            .await?
            .into_iter()
            .find(|t| t.thumbnail.as_deref() == Some(label)))
    }

    /// Load a record as a fresh in-memory attachment.
    async fn reload(&self, id: i64) -> AttachmentResult<Attachment> {
        self.find(id)
            .await?
            .map(Attachment::from_record)
            .ok_or_else(|| AttachmentError::Repository(format!("attachment {} not found", id)))
    }
}

/// Repository keeping rows in process memory.
#[derive(Default)]
pub struct InMemoryAttachmentRepository {
    rows: Mutex<Rows>,
}

#[derive(Default)]
struct Rows {
    next_id: i64,
    records: BTreeMap<i64, AttachmentRecord>,
}

impl InMemoryAttachmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|rows| rows.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> AttachmentResult<std::sync::MutexGuard<'_, Rows>> {
        self.rows
            .lock()
            .map_err(|_| AttachmentError::Repository("attachment rows lock poisoned".to_string()))
    }

    fn with_row<T>(
        &self,
        id: i64,
        f: impl FnOnce(&mut AttachmentRecord) -> T,
    ) -> AttachmentResult<T> {
        let mut rows = self.lock()?;
        let record = rows
            .records
            .get_mut(&id)
            .ok_or_else(|| AttachmentError::Repository(format!("attachment {} not found", id)))?;
        Ok(f(record))
    }
}

#[async_trait]
impl AttachmentRepository for InMemoryAttachmentRepository {
    async fn insert(&self, record: &AttachmentRecord) -> AttachmentResult<i64> {
        let mut rows = self.lock()?;
        rows.next_id += 1;
        let id = rows.next_id;
        let mut stored = record.clone();
        stored.id = Some(id);
        rows.records.insert(id, stored);
        Ok(id)
    }

    async fn update(&self, record: &AttachmentRecord) -> AttachmentResult<()> {
        let id = record
            .id
            .ok_or_else(|| AttachmentError::Repository("cannot update a new record".to_string()))?;
        self.with_row(id, |row| *row = record.clone())
    }

    async fn update_stores(&self, id: i64, stores: &StoreSet) -> AttachmentResult<()> {
        self.with_row(id, |row| row.stores = stores.clone())
    }

    async fn update_blob_ref(&self, id: i64, db_file_id: Option<i64>) -> AttachmentResult<()> {
        self.with_row(id, |row| row.db_file_id = db_file_id)
    }

    async fn delete(&self, id: i64) -> AttachmentResult<()> {
        self.lock()?.records.remove(&id);
        Ok(())
    }

    async fn find(&self, id: i64) -> AttachmentResult<Option<AttachmentRecord>> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    async fn find_thumbnails(&self, parent_id: i64) -> AttachmentResult<Vec<AttachmentRecord>> {
        Ok(self
            .lock()?
            .records
            .values()
            .filter(|r| r.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let repo = InMemoryAttachmentRepository::new();
        let first = repo.insert(&AttachmentRecord::default()).await.unwrap();
        let second = repo.insert(&AttachmentRecord::default()).await.unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(repo.find(first).await.unwrap().unwrap().id, Some(1));
    }

    #[tokio::test]
    async fn test_update_stores_touches_only_stores() {
        let repo = InMemoryAttachmentRepository::new();
        let id = repo
            .insert(&AttachmentRecord {
                filename: Some("a.png".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        repo.update_stores(id, &StoreSet::from(["fs"])).await.unwrap();

        let row = repo.find(id).await.unwrap().unwrap();
        assert_eq!(row.stores, StoreSet::from(["fs"]));
        assert_eq!(row.filename.as_deref(), Some("a.png"));
    }

    #[tokio::test]
    async fn test_find_thumbnail_by_label() {
        let repo = InMemoryAttachmentRepository::new();
        let parent = repo.insert(&AttachmentRecord::default()).await.unwrap();
        for label in ["thumb", "small"] {
            repo.insert(&Attachment::thumbnail_of(parent, label).record)
                .await
                .unwrap();
        }

        assert_eq!(repo.find_thumbnails(parent).await.unwrap().len(), 2);
        let small = repo.find_thumbnail(parent, "small").await.unwrap().unwrap();
        assert_eq!(small.thumbnail.as_deref(), Some("small"));
        assert!(repo.find_thumbnail(parent, "large").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reload_missing_row() {
        let repo = InMemoryAttachmentRepository::new();
        assert!(repo.reload(42).await.is_err());
    }
}
