//! Save and destroy hooks a host calls for each attachment.
//!
//! `save` runs the whole write path in order: validate, rename stored copies, resolve the
//! target stores, write the row, reconcile the stores, then process or queue new uploads.

use crate::attachment_type::AttachmentType;
use crate::pipeline::ProcessOptions;
use affix_core::{Attachment, AttachmentError, AttachmentResult, Upload};
use futures::future::{BoxFuture, FutureExt};
use std::time::Instant;

impl AttachmentType {
    /// Copy `upload` into a temp file and mark the attachment for processing on its next save.
    ///
    /// Returns false for empty uploads, which leave the attachment untouched.
    pub async fn set_upload(
        &self,
        attachment: &mut Attachment,
        upload: Upload,
    ) -> AttachmentResult<bool> {
        Ok(attachment.set_upload(upload, self.temp_dir()).await?)
    }

    pub async fn reload(&self, id: i64) -> AttachmentResult<Attachment> {
        self.repository.reload(id).await
    }

    /// Persist the attachment and its bytes.
    ///
    /// Returns `Ok(false)` when validation fails; the errors are left in
    /// `attachment.errors` and nothing is written.
    pub fn save<'a>(&'a self, attachment: &'a mut Attachment) -> BoxFuture<'a, AttachmentResult<bool>> {
        async move {
            let errors = self.rules.validate(&attachment.record);
            if !errors.is_empty() {
                tracing::debug!(
                    attachment_type = %self.name,
                    attachment_id = ?attachment.id(),
                    errors = ?errors,
                    "Attachment failed validation"
                );
                attachment.errors = errors;
                return Ok(false);
            }
            attachment.errors.clear();

            let start = Instant::now();
            let created = attachment.is_new_record();

            // stored copies move before the target stores read them
            if let Some(previous) = attachment.take_previous_filename() {
                if !created {
                    self.delegator.rename_files(attachment, &previous).await?;
                }
            }

            let old = self.delegator.prepare(attachment).await?;

            let id = if created {
                let id = self.repository.insert(&attachment.record).await?;
                attachment.record.id = Some(id);
                attachment.mark_created();
                id
            } else {
                self.repository.update(&attachment.record).await?;
                attachment.id().ok_or_else(|| {
                    AttachmentError::Repository("persisted attachment has no id".to_string())
                })?
            };

            let db_file_id = attachment.record.db_file_id;
            if let Err(e) = self
                .delegator
                .persist(attachment, &old, self.repository.as_ref())
                .await
            {
                self.roll_back(attachment, id, created, &old, &e).await;
                return Err(e);
            }
            if attachment.record.db_file_id != db_file_id {
                self.repository
                    .update_blob_ref(id, attachment.record.db_file_id)
                    .await?;
            }

            if !created && old != attachment.record.stores {
                self.retarget_thumbnails(attachment, id).await?;
            }

            if attachment.take_pending_processing() {
                if self.options.queued {
                    self.queue.enqueue(&self.name, id).await?;
                } else {
                    self.process(attachment, ProcessOptions::default()).await?;
                }
            }

            attachment.clear_temp_paths();

            tracing::info!(
                attachment_type = %self.name,
                attachment_id = id,
                created,
                stores = %attachment.record.stores,
                size_bytes = ?attachment.record.size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Attachment saved"
            );

            Ok(true)
        }
        .boxed()
    }

    async fn roll_back(
        &self,
        attachment: &mut Attachment,
        id: i64,
        created: bool,
        old: &affix_core::StoreSet,
        error: &AttachmentError,
    ) {
        if created {
            if let Err(delete_error) = self.repository.delete(id).await {
                tracing::error!(
                    attachment_id = id,
                    error = %delete_error,
                    "Failed to remove row of unstored attachment"
                );
            }
            attachment.record.id = None;
        } else if matches!(error, AttachmentError::AllStoresFailed { .. }) {
            attachment.record.stores = old.clone();
            if let Err(update_error) = self.repository.update_stores(id, old).await {
                tracing::error!(
                    attachment_id = id,
                    error = %update_error,
                    "Failed to restore declared stores"
                );
            }
        }
        tracing::error!(
            attachment_type = %self.name,
            attachment_id = id,
            created,
            error = %error,
            "Attachment save failed"
        );
    }

    /// Move every thumbnail of `attachment` to the stores it now declares.
    async fn retarget_thumbnails(&self, attachment: &Attachment, id: i64) -> AttachmentResult<()> {
        if !self.schema.thumbnails || attachment.record.parent_id.is_some() {
            return Ok(());
        }

        let thumbnail_type = self.thumbnail_type();
        for record in thumbnail_type.repository().find_thumbnails(id).await? {
            let mut thumbnail = Attachment::from_record(record);
            thumbnail.set_stores(attachment.record.stores.clone());
            if !thumbnail_type.save(&mut thumbnail).await? {
                tracing::warn!(
                    attachment_id = id,
                    thumbnail_id = ?thumbnail.id(),
                    errors = ?thumbnail.errors,
                    "Thumbnail could not follow its parent's stores"
                );
            }
        }
        Ok(())
    }

    /// Delete the attachment, its thumbnails, and every stored copy of their bytes.
    pub fn destroy<'a>(&'a self, attachment: &'a mut Attachment) -> BoxFuture<'a, AttachmentResult<()>> {
        async move {
            let Some(id) = attachment.id() else {
                attachment.clear_temp_paths();
                return Ok(());
            };

            if self.schema.thumbnails && attachment.record.parent_id.is_none() {
                let thumbnail_type = self.thumbnail_type();
                for record in thumbnail_type.repository().find_thumbnails(id).await? {
                    let mut thumbnail = Attachment::from_record(record);
                    thumbnail_type.destroy(&mut thumbnail).await?;
                }
            }

            self.delegator.destroy_files(&attachment.record).await?;
            self.repository.delete(id).await?;
            attachment.clear_temp_paths();

            tracing::info!(
                attachment_type = %self.name,
                attachment_id = id,
                "Attachment destroyed"
            );
            Ok(())
        }
        .boxed()
    }
}
