//! `resize` and `get_image_size`.
//!
//! Options for `resize`:
//! - `to`: geometry, required
//! - `with`: adapter name, defaults to the type's processor
//! - `destination`: write here instead of replacing the working bytes
//! - `skip_size`: leave `width` and `height` alone

use super::{Task, TaskContext, TaskImpl, TaskOptions, TaskTable};
use crate::geometry::GeometrySpec;
use crate::image::{adapter_named, with_image, ImageAdapter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Defines both tasks.
pub fn load(table: &mut TaskTable) {
    table.define(
        "resize",
        TaskImpl::constructor(|_, options| {
            // reject bad geometry when the task is queued, not when it first runs
            if let Some(spec) = options.parse::<GeometrySpec>("to").map_err(config_error)? {
                spec.target().map_err(config_error)?;
            }
            Ok(Arc::new(ResizeTask))
        }),
    );
    table.define("get_image_size", TaskImpl::callable(ImageSizeTask));
}

fn config_error(error: impl std::fmt::Display) -> affix_core::AttachmentError {
    affix_core::AttachmentError::Configuration(format!("invalid resize options: {}", error))
}

pub struct ResizeTask;

impl ResizeTask {
    fn adapter(ctx: &TaskContext<'_>, options: &TaskOptions) -> anyhow::Result<Arc<dyn ImageAdapter>> {
        Ok(match options.str("with") {
            Some(name) => adapter_named(name, ctx.kind.config().jpeg_quality)?,
            None => ctx.kind.adapter().clone(),
        })
    }
}

#[async_trait::async_trait]
impl Task for ResizeTask {
    async fn call(&self, ctx: &mut TaskContext<'_>, options: &TaskOptions) -> anyhow::Result<()> {
        let target = options.require::<GeometrySpec>("to")?.target()?;
        let adapter = Self::adapter(ctx, options)?;
        let source = ctx.working_copy().await?;
        let destination = options.str("destination").map(PathBuf::from);

        let in_place = destination.is_none();
        let output = match destination {
            Some(path) => Output::Path(path),
            None => Output::Temp(ctx.kind.temp_dir().to_path_buf(), extension_of(&source)),
        };

        let resized = with_image(adapter, source, move |adapter, image| {
            let resized = adapter.resize(&image, &target);
            let dimensions = adapter.dimensions(&resized);
            let written = match output {
                Output::Path(path) => {
                    adapter.encode(&resized, &path)?;
                    None
                }
                Output::Temp(dir, suffix) => {
                    std::fs::create_dir_all(&dir)?;
                    let temp = tempfile::Builder::new()
                        .prefix("affix-")
                        .suffix(&suffix)
                        .tempfile_in(&dir)?
                        .into_temp_path();
                    adapter.encode(&resized, &temp)?;
                    Some(temp)
                }
            };
            Ok((dimensions, written))
        })
        .await?;

        let Some(((width, height), written)) = resized else {
            return Ok(());
        };

        if let Some(temp) = written {
            ctx.attachment.push_temp_path(temp).await?;
        }
        if in_place && ctx.kind.schema().dimensions && !options.flag("skip_size") {
            ctx.attachment.record.width = Some(width);
            ctx.attachment.record.height = Some(height);
        }

        tracing::debug!(
            attachment_id = ?ctx.attachment.id(),
            width,
            height,
            in_place,
            "Resized attachment image"
        );

        Ok(())
    }
}

enum Output {
    Path(PathBuf),
    Temp(PathBuf, String),
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

/// Records the working image's dimensions.
pub struct ImageSizeTask;

#[async_trait::async_trait]
impl Task for ImageSizeTask {
    async fn call(&self, ctx: &mut TaskContext<'_>, _options: &TaskOptions) -> anyhow::Result<()> {
        if !ctx.kind.schema().dimensions {
            return Ok(());
        }
        let source = ctx.working_copy().await?;
        let adapter = ctx.kind.adapter().clone();

        if let Some((width, height)) =
            with_image(adapter, source, |adapter, image| Ok(adapter.dimensions(&image))).await?
        {
            ctx.attachment.record.width = Some(width);
            ctx.attachment.record.height = Some(height);
        }
        Ok(())
    }
}
