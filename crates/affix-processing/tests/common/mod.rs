#![allow(dead_code)]

use affix_core::{AffixConfig, AttachmentRecord};
use affix_processing::{AttachmentOptions, AttachmentType};
use affix_storage::{
    AttachmentStore, StorageDelegator, StorageError, StorageResult, StoreBinding, StoreKind,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Behavior {
    Succeed,
    Fail,
    Hang,
}

/// One store operation: `(op, store, attachment id)`.
pub type Event = (&'static str, String, i64);

#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<Event>>>);

impl Log {
    pub fn push(&self, op: &'static str, store: &str, id: i64) {
        self.0.lock().unwrap().push((op, store.to_string(), id));
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    /// Sorted store names `op` ran against.
    pub fn stores(&self, op: &str) -> Vec<String> {
        let mut stores: Vec<String> = self
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _, _)| *o == op)
            .map(|(_, store, _)| store.clone())
            .collect();
        stores.sort();
        stores
    }

    pub fn count(&self, op: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|(o, _, _)| *o == op).count()
    }

    pub fn ids(&self, op: &str) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _, _)| *o == op)
            .map(|(_, _, id)| *id)
            .collect();
        ids.sort();
        ids
    }
}

/// In-memory store recording every save, destroy and rename.
pub struct RecordingStore {
    binding: StoreBinding,
    behavior: Mutex<Behavior>,
    log: Log,
    files: Mutex<HashMap<i64, Bytes>>,
}

impl RecordingStore {
    pub fn new(binding: StoreBinding, behavior: Behavior, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            binding,
            behavior: Mutex::new(behavior),
            log: log.clone(),
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn holds(&self, id: i64) -> bool {
        self.files.lock().unwrap().contains_key(&id)
    }

    pub fn data(&self, id: i64) -> Option<Bytes> {
        self.files.lock().unwrap().get(&id).cloned()
    }

    fn id(record: &AttachmentRecord) -> StorageResult<i64> {
        record
            .id
            .ok_or_else(|| StorageError::InvalidKey("record has no id".to_string()))
    }
}

#[async_trait]
impl AttachmentStore for RecordingStore {
    fn binding(&self) -> &StoreBinding {
        &self.binding
    }

    fn full_filename(&self, record: &AttachmentRecord) -> StorageResult<Option<String>> {
        Ok(record
            .filename
            .as_ref()
            .map(|f| format!("{}/{}", self.binding.name, f)))
    }

    async fn current_data(&self, record: &AttachmentRecord) -> StorageResult<Bytes> {
        let id = Self::id(record)?;
        self.data(id)
            .ok_or_else(|| StorageError::NotFound(format!("{} in {}", id, self.binding.name)))
    }

    async fn write_file(&self, record: &mut AttachmentRecord, data: Bytes) -> StorageResult<()> {
        let id = Self::id(record)?;
        self.log.push("save", &self.binding.name, id);
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::Succeed => {
                self.files.lock().unwrap().insert(id, data);
                Ok(())
            }
            Behavior::Fail => Err(StorageError::UploadFailed("store unreachable".to_string())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }
    }

    async fn destroy_file(&self, record: &AttachmentRecord) -> StorageResult<()> {
        let id = Self::id(record)?;
        self.log.push("destroy", &self.binding.name, id);
        self.files.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn rename_file(&self, record: &AttachmentRecord, _previous: &str) -> StorageResult<()> {
        self.log.push("rename", &self.binding.name, Self::id(record)?);
        Ok(())
    }
}

pub fn config(dir: &Path) -> AffixConfig {
    AffixConfig {
        temp_dir: dir.join("tmp"),
        ..Default::default()
    }
}

/// Recording stores named `names`, the first flagged default.
pub fn stores(names: &[&str], log: &Log) -> Vec<Arc<RecordingStore>> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let binding = StoreBinding::new(*name, StoreKind::Remote)
                .with_save_timeout(Duration::from_millis(100));
            let binding = if i == 0 { binding.as_default() } else { binding };
            RecordingStore::new(binding, Behavior::Succeed, log)
        })
        .collect()
}

pub fn delegator(stores: &[Arc<RecordingStore>], dir: &Path) -> StorageDelegator {
    let stores: Vec<Arc<dyn AttachmentStore>> = stores
        .iter()
        .map(|s| s.clone() as Arc<dyn AttachmentStore>)
        .collect();
    StorageDelegator::new(stores, dir.join("tmp"), Duration::from_secs(1)).unwrap()
}

pub async fn attachment_type(
    name: &str,
    options: AttachmentOptions,
    stores: &[Arc<RecordingStore>],
    dir: &Path,
) -> AttachmentType {
    AttachmentType::builder(name)
        .options(options)
        .config(config(dir))
        .delegator(delegator(stores, dir))
        .build()
        .await
        .unwrap()
}

/// A PNG of `width` by `height` pixels.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
