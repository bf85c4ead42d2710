//! `remote_sync`: copy the working bytes into another bound store.
//!
//! Options:
//! - `store`: name of a store bound to the attachment type, required

use super::{Task, TaskContext, TaskImpl, TaskOptions, TaskTable};
use affix_core::{AttachmentError, StoreKind};
use std::sync::Arc;
use std::time::Instant;

pub fn load(table: &mut TaskTable) {
    table.define(
        "remote_sync",
        TaskImpl::constructor(|_, options| {
            if options.str("store").is_none() {
                return Err(AttachmentError::Configuration(
                    "remote_sync task needs a `store` name".to_string(),
                ));
            }
            Ok(Arc::new(RemoteSyncTask))
        }),
    );
}

pub struct RemoteSyncTask;

#[async_trait::async_trait]
impl Task for RemoteSyncTask {
    async fn call(&self, ctx: &mut TaskContext<'_>, options: &TaskOptions) -> anyhow::Result<()> {
        let name: String = options.require("store")?;
        let kind = ctx.kind;
        let delegator = kind.delegator();
        let store = delegator.store(&name)?;

        if ctx.attachment.record.stores.contains(&name) && !ctx.attachment.has_pending_data() {
            return Ok(());
        }

        let data = match ctx.attachment.temp_data().await? {
            Some(data) => data,
            None => delegator.current_data(&ctx.attachment.record).await?,
        };
        let size_bytes = data.len();
        let start = Instant::now();

        store
            .write_file(&mut ctx.attachment.record, data)
            .await
            .map_err(|e| e.into_attachment_error(&name))?;
        ctx.attachment.record.stores.insert(name.as_str());

        if let Some(id) = ctx.attachment.id() {
            kind.repository()
                .update_stores(id, &ctx.attachment.record.stores)
                .await?;
            if store.kind() == StoreKind::DbFile {
                kind.repository()
                    .update_blob_ref(id, ctx.attachment.record.db_file_id)
                    .await?;
            }
        }

        tracing::info!(
            attachment_id = ?ctx.attachment.id(),
            store = %name,
            size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Attachment synced to store"
        );

        Ok(())
    }
}
