//! Attachment model: persisted columns plus the transient upload state of one record.

use super::{StoreSet, TaskProgress, Upload, UploadSource};
use crate::constants::is_image_content_type;
use crate::validation::{sanitize_filename, ValidationError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Persisted columns of an attachment row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub id: Option<i64>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub parent_id: Option<i64>,
    pub thumbnail: Option<String>,
    pub stores: StoreSet,
    pub task_progress: TaskProgress,
    pub processed_at: Option<DateTime<Utc>>,
    pub db_file_id: Option<i64>,
}

impl AttachmentRecord {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(is_image_content_type)
    }

    /// Only primary image attachments spawn thumbnails.
    pub fn is_thumbnailable(&self) -> bool {
        self.is_image() && self.parent_id.is_none()
    }

    /// Id used to build storage paths. Thumbnails live next to their parent.
    pub fn path_id(&self) -> Option<i64> {
        self.parent_id.or(self.id)
    }

    /// Filename of the thumbnail variant `label`: `photo.jpg` becomes `photo_thumb.jpg`.
    pub fn thumbnail_name_for(&self, label: &str) -> Option<String> {
        let filename = self.filename.as_deref()?;
        if label.is_empty() {
            return Some(filename.to_string());
        }
        Some(match split_extension(filename) {
            (base, Some(ext)) => format!("{}_{}.{}", base, label, ext),
            (base, None) => format!("{}_{}", base, label),
        })
    }
}

/// Split `name.ext` on the last dot. A trailing word after the dot counts as the extension.
fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(idx)
            if idx + 1 < filename.len()
                && filename[idx + 1..]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            (&filename[..idx], Some(&filename[idx + 1..]))
        }
        _ => (filename, None),
    }
}

/// Processing state of an in-memory attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingState {
    #[default]
    Unprocessed,
    Processing,
    Complete,
    /// A task failed on a record without progress tracking.
    Failed,
}

/// An attachment record together with its pending, never persisted, state.
#[derive(Debug, Default)]
pub struct Attachment {
    pub record: AttachmentRecord,
    pub state: ProcessingState,
    /// Validation errors from the last save attempt.
    pub errors: Vec<ValidationError>,
    // most recent first
    temp_paths: Vec<TempPath>,
    target_stores: Option<StoreSet>,
    previous_filename: Option<String>,
    new_attachment: bool,
    pending_processing: bool,
}

impl Attachment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a record loaded from a repository.
    pub fn from_record(record: AttachmentRecord) -> Self {
        Self {
            record,
            ..Default::default()
        }
    }

    /// A fresh thumbnail record for `parent_id` labelled `label`.
    pub fn thumbnail_of(parent_id: i64, label: impl Into<String>) -> Self {
        Self::from_record(AttachmentRecord {
            parent_id: Some(parent_id),
            thumbnail: Some(label.into()),
            ..Default::default()
        })
    }

    pub fn id(&self) -> Option<i64> {
        self.record.id
    }

    pub fn is_new_record(&self) -> bool {
        self.record.id.is_none()
    }

    /// Set the sanitized filename. Renaming a persisted record remembers the first previous
    /// name so stores can move their copies on the next save.
    pub fn set_filename(&mut self, filename: &str) {
        let sanitized = sanitize_filename(filename);
        if self.record.id.is_some() && self.previous_filename.is_none() {
            if let Some(current) = &self.record.filename {
                if *current != sanitized {
                    self.previous_filename = Some(current.clone());
                }
            }
        }
        self.record.filename = Some(sanitized);
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.record.content_type = Some(content_type.trim().to_string());
    }

    /// Assign the stores this record should live in after the next save.
    pub fn set_stores(&mut self, stores: impl Into<StoreSet>) {
        self.target_stores = Some(stores.into());
    }

    pub fn target_stores(&self) -> Option<&StoreSet> {
        self.target_stores.as_ref()
    }

    pub fn take_target_stores(&mut self) -> Option<StoreSet> {
        self.target_stores.take()
    }

    pub fn previous_filename(&self) -> Option<&str> {
        self.previous_filename.as_deref()
    }

    pub fn take_previous_filename(&mut self) -> Option<String> {
        self.previous_filename.take()
    }

    /// Copy uploaded bytes into a temp file under `temp_dir`.
    ///
    /// Empty uploads are ignored and return `Ok(false)`.
    pub async fn set_upload(&mut self, upload: Upload, temp_dir: &Path) -> io::Result<bool> {
        let empty = match &upload.source {
            UploadSource::Bytes(data) => data.is_empty(),
            UploadSource::Path(path) => tokio::fs::metadata(path).await?.len() == 0,
            UploadSource::Reader(_) => false,
        };
        if empty {
            tracing::debug!(attachment_id = ?self.record.id, "Ignoring empty upload");
            return Ok(false);
        }

        if let Some(filename) = &upload.filename {
            self.set_filename(filename);
        }
        if let Some(content_type) = &upload.content_type {
            self.set_content_type(content_type);
        }

        let temp_path = write_temp_file(temp_dir, self.extension(), upload.source).await?;
        if tokio::fs::metadata(&temp_path).await?.len() == 0 {
            return Ok(false);
        }

        self.push_temp_path(temp_path).await?;
        self.pending_processing = true;

        tracing::debug!(
            attachment_id = ?self.record.id,
            filename = ?self.record.filename,
            size_bytes = ?self.record.size,
            "Upload copied to temp file"
        );

        Ok(true)
    }

    /// Write `data` to a new temp file and make it the pending bytes.
    pub async fn write_temp_data(&mut self, data: Bytes, temp_dir: &Path) -> io::Result<()> {
        let temp_path =
            write_temp_file(temp_dir, self.extension(), UploadSource::Bytes(data)).await?;
        self.push_temp_path(temp_path).await
    }

    /// Make `path` the most recent pending bytes and update `size` to match.
    pub async fn push_temp_path(&mut self, path: TempPath) -> io::Result<()> {
        let size = tokio::fs::metadata(&path).await?.len();
        self.record.size = Some(size as i64);
        self.temp_paths.insert(0, path);
        Ok(())
    }

    pub fn latest_temp_path(&self) -> Option<&Path> {
        self.temp_paths.first().map(|p| &**p)
    }

    pub fn has_pending_data(&self) -> bool {
        !self.temp_paths.is_empty()
    }

    /// Bytes of the most recent temp file, if any.
    pub async fn temp_data(&self) -> io::Result<Option<Bytes>> {
        match self.latest_temp_path() {
            Some(path) => Ok(Some(Bytes::from(tokio::fs::read(path).await?))),
            None => Ok(None),
        }
    }

    /// Drop every pending temp file. The files are deleted with their handles.
    pub fn clear_temp_paths(&mut self) {
        self.temp_paths.clear();
    }

    pub fn mark_created(&mut self) {
        self.new_attachment = true;
    }

    /// True for records created by this in-memory instance.
    pub fn is_new_attachment(&self) -> bool {
        self.new_attachment
    }

    /// True when uploaded bytes are waiting for the task chain.
    pub fn pending_processing(&self) -> bool {
        self.pending_processing
    }

    pub fn take_pending_processing(&mut self) -> bool {
        std::mem::take(&mut self.pending_processing)
    }

    fn extension(&self) -> Option<String> {
        self.record
            .filename
            .as_deref()
            .and_then(|f| split_extension(f).1)
            .map(|ext| format!(".{}", ext))
    }
}

async fn write_temp_file(
    temp_dir: &Path,
    suffix: Option<String>,
    source: UploadSource,
) -> io::Result<TempPath> {
    let temp_dir: PathBuf = temp_dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&temp_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("affix-")
            .suffix(suffix.as_deref().unwrap_or(""))
            .tempfile_in(&temp_dir)?;

        match source {
            UploadSource::Path(path) => {
                let mut input = std::fs::File::open(path)?;
                io::copy(&mut input, &mut file)?;
            }
            UploadSource::Bytes(data) => {
                io::Write::write_all(&mut file, &data)?;
            }
            UploadSource::Reader(mut reader) => {
                io::copy(&mut reader, &mut file)?;
            }
        }

        io::Write::flush(&mut file)?;
        Ok(file.into_temp_path())
    })
    .await
    .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_name_for() {
        let record = AttachmentRecord {
            filename: Some("photo.jpg".to_string()),
            ..Default::default()
        };
        assert_eq!(record.thumbnail_name_for("thumb").unwrap(), "photo_thumb.jpg");
        assert_eq!(record.thumbnail_name_for("").unwrap(), "photo.jpg");

        let record = AttachmentRecord {
            filename: Some("README".to_string()),
            ..Default::default()
        };
        assert_eq!(record.thumbnail_name_for("small").unwrap(), "README_small");
    }

    #[test]
    fn test_path_id_prefers_parent() {
        let record = AttachmentRecord {
            id: Some(7),
            parent_id: Some(3),
            ..Default::default()
        };
        assert_eq!(record.path_id(), Some(3));
    }

    #[test]
    fn test_rename_remembers_first_previous_name() {
        let mut attachment = Attachment::from_record(AttachmentRecord {
            id: Some(1),
            filename: Some("a.png".to_string()),
            ..Default::default()
        });
        attachment.set_filename("b.png");
        attachment.set_filename("c.png");
        assert_eq!(attachment.previous_filename(), Some("a.png"));
        assert_eq!(attachment.record.filename.as_deref(), Some("c.png"));
    }

    #[test]
    fn test_new_record_does_not_track_rename() {
        let mut attachment = Attachment::new();
        attachment.set_filename("a.png");
        attachment.set_filename("b.png");
        assert!(attachment.previous_filename().is_none());
    }

    #[tokio::test]
    async fn test_set_upload_from_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut attachment = Attachment::new();
        let stored = attachment
            .set_upload(
                Upload::from_bytes(&b"hello"[..])
                    .with_filename("shake & bake.txt")
                    .with_content_type(" text/plain "),
                dir.path(),
            )
            .await
            .unwrap();

        assert!(stored);
        assert_eq!(attachment.record.filename.as_deref(), Some("shake___bake.txt"));
        assert_eq!(attachment.record.content_type.as_deref(), Some("text/plain"));
        assert_eq!(attachment.record.size, Some(5));
        assert!(attachment.pending_processing());

        let path = attachment.latest_temp_path().unwrap().to_path_buf();
        assert_eq!(path.extension().unwrap(), "txt");
        assert_eq!(attachment.temp_data().await.unwrap().unwrap(), &b"hello"[..]);

        attachment.clear_temp_paths();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_upload_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut attachment = Attachment::new();
        let stored = attachment
            .set_upload(Upload::from_bytes(Bytes::new()), dir.path())
            .await
            .unwrap();
        assert!(!stored);
        assert!(!attachment.has_pending_data());
        assert!(attachment.record.size.is_none());
    }

    #[tokio::test]
    async fn test_size_follows_latest_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut attachment = Attachment::new();
        attachment
            .set_upload(Upload::from_reader(io::Cursor::new(vec![1u8; 10])), dir.path())
            .await
            .unwrap();
        assert_eq!(attachment.record.size, Some(10));

        attachment
            .write_temp_data(Bytes::from_static(b"abc"), dir.path())
            .await
            .unwrap();
        assert_eq!(attachment.record.size, Some(3));
        assert_eq!(attachment.temp_data().await.unwrap().unwrap(), &b"abc"[..]);
    }

    #[tokio::test]
    async fn test_push_temp_path_measures_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut attachment = Attachment::new();

        let file = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
        tokio::fs::write(file.path(), b"1234567").await.unwrap();
        attachment.push_temp_path(file.into_temp_path()).await.unwrap();
        assert_eq!(attachment.record.size, Some(7));

        let missing = tempfile::NamedTempFile::new_in(dir.path()).unwrap().into_temp_path();
        std::fs::remove_file(&missing).unwrap();
        assert!(attachment.push_temp_path(missing).await.is_err());
        assert_eq!(attachment.record.size, Some(7));
        assert_eq!(attachment.temp_data().await.unwrap().unwrap(), &b"1234567"[..]);
    }
}
