//! Routes a record's storage operations to the stores in its declared set.
//!
//! On every save the declared set is reconciled: the record is written to each target store
//! and removed from stores it no longer declares. Types bound to a single store propagate
//! store failures. Types bound to several stores bound each save with a timeout and drop a
//! failing store from the record's declared set so the remaining stores stay durable.

use crate::store::AttachmentStore;
use affix_core::{
    Attachment, AttachmentError, AttachmentRecord, AttachmentRepository, AttachmentResult,
    StoreKind, StoreSet,
};
use bytes::Bytes;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct StorageDelegator {
    stores: Vec<Arc<dyn AttachmentStore>>,
    temp_dir: PathBuf,
    default_timeout: Duration,
}

impl fmt::Debug for StorageDelegator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageDelegator")
            .field("stores", &self.stores.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("temp_dir", &self.temp_dir)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl StorageDelegator {
    /// Create a delegator over `stores`, in binding order.
    ///
    /// Fails if no store is bound, a name is bound twice, or more than one store is flagged
    /// default.
    pub fn new(
        stores: Vec<Arc<dyn AttachmentStore>>,
        temp_dir: impl Into<PathBuf>,
        default_timeout: Duration,
    ) -> AttachmentResult<Self> {
        if stores.is_empty() {
            return Err(AttachmentError::Configuration(
                "at least one store must be bound".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for store in &stores {
            if !names.insert(store.name().to_string()) {
                return Err(AttachmentError::Configuration(format!(
                    "store `{}` is bound twice",
                    store.name()
                )));
            }
        }

        let defaults = stores.iter().filter(|s| s.binding().default).count();
        if defaults > 1 {
            return Err(AttachmentError::Configuration(
                "at most one store may be flagged default".to_string(),
            ));
        }

        Ok(Self {
            stores,
            temp_dir: temp_dir.into(),
            default_timeout,
        })
    }

    pub fn stores(&self) -> impl Iterator<Item = &Arc<dyn AttachmentStore>> {
        self.stores.iter()
    }

    pub fn is_multi_store(&self) -> bool {
        self.stores.len() > 1
    }

    pub fn temp_dir(&self) -> &std::path::Path {
        &self.temp_dir
    }

    /// Look up a bound store by name.
    pub fn store(&self, name: &str) -> AttachmentResult<&Arc<dyn AttachmentStore>> {
        self.stores
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| {
                AttachmentError::Configuration(format!("no store is bound as `{}`", name))
            })
    }

    /// Stores a new record lands in when no target set was assigned.
    pub fn default_stores(&self) -> StoreSet {
        match self.stores.as_slice() {
            [single] => StoreSet::from([single.name()]),
            stores => stores
                .iter()
                .filter(|s| s.binding().default)
                .map(|s| s.name())
                .collect(),
        }
    }

    /// Stores the record currently lives in. Single-store types without a `stores` column
    /// implicitly live in their only store.
    pub fn declared(&self, record: &AttachmentRecord) -> StoreSet {
        if record.stores.is_empty() && !self.is_multi_store() {
            self.default_stores()
        } else {
            record.stores.clone()
        }
    }

    /// Store reads go to: the default store if declared, else the first declared bound store.
    pub fn primary_store(&self, record: &AttachmentRecord) -> Option<&Arc<dyn AttachmentStore>> {
        let declared = self.declared(record);
        self.stores
            .iter()
            .filter(|s| declared.contains(s.name()))
            .max_by_key(|s| s.binding().default)
    }

    /// Read the record's bytes from its primary store.
    pub async fn current_data(&self, record: &AttachmentRecord) -> AttachmentResult<Bytes> {
        let store = self.primary_store(record).ok_or_else(|| {
            AttachmentError::Configuration(format!(
                "attachment {:?} is not declared in any bound store",
                record.id
            ))
        })?;
        store
            .current_data(record)
            .await
            .map_err(|e| e.into_attachment_error(store.name()))
    }

    /// Resolve the record's target store set before its row is written.
    ///
    /// Returns the store set the record was persisted with before this save. When the target
    /// differs and no upload is pending, the current bytes are copied into a temp file so the
    /// new stores have something to write.
    pub async fn prepare(&self, attachment: &mut Attachment) -> AttachmentResult<StoreSet> {
        let (old, target) = if attachment.is_new_record() {
            let target = attachment
                .take_target_stores()
                .unwrap_or_else(|| self.default_stores());
            if target.is_empty() {
                return Err(AttachmentError::Configuration(
                    "no target store for new attachment and no default store is configured"
                        .to_string(),
                ));
            }
            (StoreSet::new(), target)
        } else {
            let old = self.declared(&attachment.record);
            let target = attachment.take_target_stores().unwrap_or_else(|| old.clone());
            if target.is_empty() {
                return Err(AttachmentError::Configuration(format!(
                    "attachment {:?} must keep at least one store",
                    attachment.id()
                )));
            }
            (old, target)
        };

        for name in target.iter() {
            self.store(name)?;
        }

        if !attachment.is_new_record() && target != old && !attachment.has_pending_data() {
            match self.current_data(&attachment.record).await {
                Ok(data) => attachment.write_temp_data(data, &self.temp_dir).await?,
                Err(AttachmentError::Store { store, message }) => {
                    tracing::warn!(
                        attachment_id = ?attachment.id(),
                        store = %store,
                        error = %message,
                        "No current data to copy into new stores"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        attachment.record.stores = target;
        Ok(old)
    }

    /// Move stored copies after a filename change. Best effort for multi-store types.
    pub async fn rename_files(
        &self,
        attachment: &Attachment,
        previous_filename: &str,
    ) -> AttachmentResult<()> {
        for name in self.declared(&attachment.record).iter() {
            let store = self.store(name)?;
            if let Err(e) = store.rename_file(&attachment.record, previous_filename).await {
                if !self.is_multi_store() {
                    return Err(e.into_attachment_error(name));
                }
                tracing::warn!(
                    attachment_id = ?attachment.id(),
                    store = %name,
                    previous_filename = %previous_filename,
                    error = %e,
                    "Store rename failed"
                );
            }
        }
        Ok(())
    }

    /// Write the record to every target store and remove it from stores in `old` it no
    /// longer declares.
    pub async fn persist(
        &self,
        attachment: &mut Attachment,
        old: &StoreSet,
        repository: &dyn AttachmentRepository,
    ) -> AttachmentResult<()> {
        let id = attachment.id().ok_or_else(|| {
            AttachmentError::Repository("attachment must be inserted before it is stored".into())
        })?;
        let target = attachment.record.stores.clone();

        if self.is_multi_store() {
            self.persist_isolated(attachment, id, &target, repository)
                .await?;
        } else {
            for name in target.iter() {
                let store = self.store(name)?;
                store
                    .save_to_storage(attachment)
                    .await
                    .map_err(|e| e.into_attachment_error(name))?;
            }
        }

        for name in old.difference(&target) {
            let store = match self.store(name) {
                Ok(store) => store,
                Err(_) => {
                    tracing::warn!(attachment_id = id, store = %name, "Dropped store is no longer bound");
                    continue;
                }
            };
            match store.destroy_file(&attachment.record).await {
                Ok(()) => {
                    if store.kind() == StoreKind::DbFile {
                        attachment.record.db_file_id = None;
                    }
                    tracing::info!(attachment_id = id, store = %name, "Removed attachment from store");
                }
                Err(e) => {
                    tracing::warn!(
                        attachment_id = id,
                        store = %name,
                        error = %e,
                        "Failed to remove attachment from dropped store"
                    );
                }
            }
        }

        Ok(())
    }

    async fn persist_isolated(
        &self,
        attachment: &mut Attachment,
        id: i64,
        target: &StoreSet,
        repository: &dyn AttachmentRepository,
    ) -> AttachmentResult<()> {
        let mut failed = Vec::new();

        for name in target.iter() {
            let store = self.store(name)?;
            let timeout = store.binding().save_timeout(self.default_timeout);
            let start = Instant::now();

            match tokio::time::timeout(timeout, store.save_to_storage(attachment)).await {
                Ok(Ok(())) => {
                    tracing::debug!(
                        attachment_id = id,
                        store = %name,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "Store save successful"
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        attachment_id = id,
                        store = %name,
                        error = %e,
                        "Store save failed, dropping store from attachment"
                    );
                    failed.push(name.to_string());
                }
                Err(_) => {
                    tracing::warn!(
                        attachment_id = id,
                        store = %name,
                        timeout_ms = timeout.as_millis() as u64,
                        "Store save timed out, dropping store from attachment"
                    );
                    failed.push(name.to_string());
                }
            }
        }

        if failed.is_empty() {
            return Ok(());
        }

        for name in &failed {
            attachment.record.stores.remove(name);
        }

        if attachment.record.stores.is_empty() {
            tracing::error!(attachment_id = id, stores = %target, "Every target store failed");
            return Err(AttachmentError::AllStoresFailed { id });
        }

        repository
            .update_stores(id, &attachment.record.stores)
            .await
    }

    /// Delete the record's bytes from every store it declares.
    ///
    /// Every store is attempted; the first failure is returned.
    pub async fn destroy_files(&self, record: &AttachmentRecord) -> AttachmentResult<()> {
        let mut first_error: Option<AttachmentError> = None;

        for name in self.declared(record).iter() {
            let store = self.store(name)?;
            if let Err(e) = store.destroy_file(record).await {
                tracing::error!(
                    attachment_id = ?record.id,
                    store = %name,
                    error = %e,
                    "Failed to destroy attachment file"
                );
                first_error.get_or_insert(e.into_attachment_error(name));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::StoreBinding;
    use crate::traits::{StorageError, StorageResult};
    use affix_core::InMemoryAttachmentRepository;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Clone, Copy, PartialEq)]
    enum Behavior {
        Succeed,
        Fail,
        Hang,
    }

    type Log = Arc<Mutex<Vec<(&'static str, String)>>>;

    struct RecordingStore {
        binding: StoreBinding,
        behavior: Behavior,
        log: Log,
        data: Mutex<Option<Bytes>>,
    }

    impl RecordingStore {
        fn new(name: &str, behavior: Behavior, log: &Log) -> Arc<dyn AttachmentStore> {
            Self::bound(StoreBinding::new(name, StoreKind::Remote), behavior, log)
        }

        fn bound(binding: StoreBinding, behavior: Behavior, log: &Log) -> Arc<dyn AttachmentStore> {
            Arc::new(Self {
                binding,
                behavior,
                log: log.clone(),
                data: Mutex::new(None),
            })
        }

        fn record(&self, op: &'static str) {
            self.log.lock().unwrap().push((op, self.binding.name.clone()));
        }
    }

    #[async_trait]
    impl AttachmentStore for RecordingStore {
        fn binding(&self) -> &StoreBinding {
            &self.binding
        }

        fn full_filename(&self, _record: &AttachmentRecord) -> StorageResult<Option<String>> {
            Ok(None)
        }

        async fn current_data(&self, _record: &AttachmentRecord) -> StorageResult<Bytes> {
            self.data
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| StorageError::NotFound(self.binding.name.clone()))
        }

        async fn write_file(&self, _record: &mut AttachmentRecord, data: Bytes) -> StorageResult<()> {
            *self.data.lock().unwrap() = Some(data);
            Ok(())
        }

        async fn save_to_storage(&self, attachment: &mut Attachment) -> StorageResult<()> {
            self.record("save");
            match self.behavior {
                Behavior::Succeed => {
                    if let Some(data) = attachment.temp_data().await? {
                        self.write_file(&mut attachment.record, data).await?;
                    }
                    Ok(())
                }
                Behavior::Fail => Err(StorageError::UploadFailed("unreachable".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            }
        }

        async fn destroy_file(&self, _record: &AttachmentRecord) -> StorageResult<()> {
            self.record("destroy");
            *self.data.lock().unwrap() = None;
            Ok(())
        }

        async fn rename_file(&self, _record: &AttachmentRecord, _previous: &str) -> StorageResult<()> {
            self.record("rename");
            Ok(())
        }
    }

    fn ops(log: &Log, op: &str) -> Vec<String> {
        let mut names: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn delegator(stores: Vec<Arc<dyn AttachmentStore>>) -> StorageDelegator {
        StorageDelegator::new(stores, std::env::temp_dir(), Duration::from_millis(50)).unwrap()
    }

    async fn persisted(repo: &InMemoryAttachmentRepository, stores: &[&str]) -> Attachment {
        let record = AttachmentRecord {
            filename: Some("a.txt".to_string()),
            stores: stores.iter().copied().collect(),
            ..Default::default()
        };
        let id = repo.insert(&record).await.unwrap();
        repo.reload(id).await.unwrap()
    }

    #[tokio::test]
    async fn test_reconciles_old_and_target_sets() {
        let log = Log::default();
        let delegator = delegator(vec![
            RecordingStore::new("a", Behavior::Succeed, &log),
            RecordingStore::new("b", Behavior::Succeed, &log),
            RecordingStore::new("c", Behavior::Succeed, &log),
        ]);
        let repo = InMemoryAttachmentRepository::new();
        let mut attachment = persisted(&repo, &["a", "b"]).await;
        attachment
            .write_temp_data(Bytes::from_static(b"x"), &std::env::temp_dir())
            .await
            .unwrap();

        attachment.set_stores(["b", "c"]);
        let old = delegator.prepare(&mut attachment).await.unwrap();
        delegator.persist(&mut attachment, &old, &repo).await.unwrap();

        assert_eq!(ops(&log, "save"), vec!["b", "c"]);
        assert_eq!(ops(&log, "destroy"), vec!["a"]);
        assert_eq!(attachment.record.stores, StoreSet::from(["b", "c"]));
    }

    #[tokio::test]
    async fn test_failing_store_is_dropped() {
        let log = Log::default();
        let delegator = delegator(vec![
            RecordingStore::new("good", Behavior::Succeed, &log),
            RecordingStore::new("bad", Behavior::Fail, &log),
        ]);
        let repo = InMemoryAttachmentRepository::new();
        let mut attachment = persisted(&repo, &["good", "bad"]).await;

        let old = delegator.prepare(&mut attachment).await.unwrap();
        delegator.persist(&mut attachment, &old, &repo).await.unwrap();

        assert_eq!(attachment.record.stores, StoreSet::from(["good"]));
        let row = repo.find(attachment.id().unwrap()).await.unwrap().unwrap();
        assert_eq!(row.stores, StoreSet::from(["good"]));
        // a failed target store is not destroyed
        assert!(ops(&log, "destroy").is_empty());
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let log = Log::default();
        let delegator = delegator(vec![
            RecordingStore::new("fast", Behavior::Succeed, &log),
            RecordingStore::new("slow", Behavior::Hang, &log),
        ]);
        let repo = InMemoryAttachmentRepository::new();
        let mut attachment = persisted(&repo, &["fast", "slow"]).await;

        let old = delegator.prepare(&mut attachment).await.unwrap();
        delegator.persist(&mut attachment, &old, &repo).await.unwrap();

        assert_eq!(attachment.record.stores, StoreSet::from(["fast"]));
    }

    #[tokio::test]
    async fn test_all_stores_failing_is_an_error() {
        let log = Log::default();
        let delegator = delegator(vec![
            RecordingStore::new("a", Behavior::Fail, &log),
            RecordingStore::new("b", Behavior::Fail, &log),
        ]);
        let repo = InMemoryAttachmentRepository::new();
        let mut attachment = persisted(&repo, &["a", "b"]).await;

        let old = delegator.prepare(&mut attachment).await.unwrap();
        let err = delegator
            .persist(&mut attachment, &old, &repo)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::AllStoresFailed { .. }));
    }

    #[test]
    fn test_debug_lists_store_names() {
        let log = Log::default();
        let delegator = delegator(vec![
            RecordingStore::new("a", Behavior::Succeed, &log),
            RecordingStore::new("b", Behavior::Succeed, &log),
        ]);
        let debug = format!("{:?}", delegator);
        assert!(debug.contains(r#"stores: ["a", "b"]"#));
    }

    #[tokio::test]
    async fn test_single_store_failure_propagates() {
        let log = Log::default();
        let delegator = delegator(vec![RecordingStore::new("only", Behavior::Fail, &log)]);
        let repo = InMemoryAttachmentRepository::new();
        let mut attachment = persisted(&repo, &[]).await;

        let old = delegator.prepare(&mut attachment).await.unwrap();
        let err = delegator
            .persist(&mut attachment, &old, &repo)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Store { ref store, .. } if store == "only"));
    }

    #[tokio::test]
    async fn test_new_record_uses_default_stores() {
        let log = Log::default();
        let delegator = delegator(vec![
            RecordingStore::bound(
                StoreBinding::new("fs", StoreKind::FileSystem).as_default(),
                Behavior::Succeed,
                &log,
            ),
            RecordingStore::new("s3", Behavior::Succeed, &log),
        ]);
        let mut attachment = Attachment::new();
        let old = delegator.prepare(&mut attachment).await.unwrap();
        assert!(old.is_empty());
        assert_eq!(attachment.record.stores, StoreSet::from(["fs"]));
    }

    #[tokio::test]
    async fn test_new_record_without_defaults_is_fatal() {
        let log = Log::default();
        let delegator = delegator(vec![
            RecordingStore::new("a", Behavior::Succeed, &log),
            RecordingStore::new("b", Behavior::Succeed, &log),
        ]);
        let mut attachment = Attachment::new();
        let err = delegator.prepare(&mut attachment).await.unwrap_err();
        assert!(matches!(err, AttachmentError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unbound_target_is_fatal() {
        let log = Log::default();
        let delegator = delegator(vec![RecordingStore::new("a", Behavior::Succeed, &log)]);
        let mut attachment = Attachment::new();
        attachment.set_stores(["nope"]);
        assert!(delegator.prepare(&mut attachment).await.is_err());
    }

    #[tokio::test]
    async fn test_migration_copies_current_data() {
        let log = Log::default();
        let a = RecordingStore::new("a", Behavior::Succeed, &log);
        let b = RecordingStore::new("b", Behavior::Succeed, &log);
        let delegator = delegator(vec![a.clone(), b.clone()]);
        let repo = InMemoryAttachmentRepository::new();
        let mut attachment = persisted(&repo, &["a"]).await;
        a.write_file(&mut attachment.record, Bytes::from_static(b"stored"))
            .await
            .unwrap();

        attachment.set_stores(["b"]);
        let old = delegator.prepare(&mut attachment).await.unwrap();
        assert!(attachment.has_pending_data());
        delegator.persist(&mut attachment, &old, &repo).await.unwrap();

        assert_eq!(
            b.current_data(&attachment.record).await.unwrap(),
            Bytes::from_static(b"stored")
        );
        assert!(a.current_data(&attachment.record).await.is_err());
    }

    #[test]
    fn test_rejects_two_defaults() {
        let log = Log::default();
        let result = StorageDelegator::new(
            vec![
                RecordingStore::bound(
                    StoreBinding::new("a", StoreKind::Remote).as_default(),
                    Behavior::Succeed,
                    &log,
                ),
                RecordingStore::bound(
                    StoreBinding::new("b", StoreKind::Remote).as_default(),
                    Behavior::Succeed,
                    &log,
                ),
            ],
            std::env::temp_dir(),
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }
}
