//! `thumbnails`: one derived attachment per configured size.
//!
//! Options:
//! - `sizes`: label to geometry, required
//! - `with`: adapter name passed on to `resize`

use super::{Task, TaskContext, TaskImpl, TaskOptions, TaskTable};
use crate::geometry::GeometrySpec;
use affix_core::{Attachment, AttachmentError};
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn load(table: &mut TaskTable) {
    table.define(
        "thumbnails",
        TaskImpl::constructor(|chain, options| {
            let sizes = ThumbnailsTask::sizes(options)?;
            let resize = chain.load("resize", TaskOptions::new())?;
            Ok(Arc::new(ThumbnailsTask { resize, sizes }))
        }),
    );
}

pub struct ThumbnailsTask {
    resize: Arc<dyn Task>,
    sizes: BTreeMap<String, GeometrySpec>,
}

impl ThumbnailsTask {
    fn sizes(options: &TaskOptions) -> Result<BTreeMap<String, GeometrySpec>, AttachmentError> {
        let sizes: BTreeMap<String, GeometrySpec> = options
            .parse("sizes")
            .map_err(|e| {
                AttachmentError::Configuration(format!(
                    "thumbnails `sizes` must map labels to geometries: {}",
                    e
                ))
            })?
            .ok_or_else(|| {
                AttachmentError::Configuration("thumbnails task needs `sizes`".to_string())
            })?;

        for (label, spec) in &sizes {
            if label.is_empty() {
                return Err(AttachmentError::Configuration(
                    "thumbnail labels must not be empty".to_string(),
                ));
            }
            spec.target().map_err(|e| {
                AttachmentError::Configuration(format!("thumbnail `{}`: {}", label, e))
            })?;
        }
        Ok(sizes)
    }
}

#[async_trait::async_trait]
impl Task for ThumbnailsTask {
    async fn call(&self, ctx: &mut TaskContext<'_>, options: &TaskOptions) -> anyhow::Result<()> {
        if !ctx.attachment.record.is_thumbnailable() {
            return Ok(());
        }
        let parent_id = ctx
            .attachment
            .id()
            .ok_or_else(|| anyhow::anyhow!("thumbnails need a saved parent attachment"))?;
        let kind = ctx.kind;
        let thumbnail_type = kind.thumbnail_type();
        // sizes passed on demand replace the ones the task was loaded with
        let sizes = if options.get("sizes").is_some() {
            Self::sizes(options)?
        } else {
            self.sizes.clone()
        };

        for (label, spec) in &sizes {
            let Some(filename) = ctx.attachment.record.thumbnail_name_for(label) else {
                continue;
            };

            let suffix = std::path::Path::new(&filename)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| format!(".{}", ext))
                .unwrap_or_default();
            tokio::fs::create_dir_all(kind.temp_dir()).await?;
            let scratch = tempfile::Builder::new()
                .prefix("affix-")
                .suffix(&suffix)
                .tempfile_in(kind.temp_dir())?
                .into_temp_path();

            let mut resize_options = TaskOptions::new()
                .with("to", spec.to_string())
                .with("destination", scratch.to_string_lossy().into_owned());
            if let Some(adapter) = options.str("with") {
                resize_options = resize_options.with("with", adapter);
            }
            self.resize.call(ctx, &resize_options).await?;

            if tokio::fs::metadata(&scratch).await?.len() == 0 {
                tracing::debug!(parent_id, label = %label, "Nothing resized, skipping thumbnail");
                continue;
            }

            let mut thumbnail = match thumbnail_type
                .repository()
                .find_thumbnail(parent_id, label)
                .await?
            {
                Some(record) => Attachment::from_record(record),
                None => Attachment::thumbnail_of(parent_id, label.as_str()),
            };
            thumbnail.set_filename(&filename);
            thumbnail.record.content_type = ctx.attachment.record.content_type.clone();
            thumbnail.push_temp_path(scratch).await?;

            if thumbnail_type.schema().dimensions {
                let path = thumbnail
                    .latest_temp_path()
                    .map(|p| p.to_path_buf())
                    .ok_or_else(|| anyhow::anyhow!("thumbnail `{}` has no data", label))?;
                if let Some((width, height)) = crate::image::with_image(
                    thumbnail_type.adapter().clone(),
                    path,
                    |adapter, image| Ok(adapter.dimensions(&image)),
                )
                .await?
                {
                    thumbnail.record.width = Some(width);
                    thumbnail.record.height = Some(height);
                }
            }

            if thumbnail_type.delegator().is_multi_store() {
                thumbnail.set_stores(ctx.attachment.record.stores.clone());
            }

            if !thumbnail_type.save(&mut thumbnail).await? {
                let errors: Vec<String> = thumbnail.errors.iter().map(|e| e.to_string()).collect();
                anyhow::bail!("thumbnail `{}` is invalid: {}", label, errors.join(", "));
            }

            tracing::info!(
                parent_id,
                thumbnail_id = ?thumbnail.id(),
                label = %label,
                filename = %filename,
                "Thumbnail saved"
            );
        }

        Ok(())
    }
}
