//! Deferred processing hand-off.

use affix_core::AttachmentResult;
use async_trait::async_trait;

/// Receives attachments of `queued` types after their bytes are stored.
///
/// A worker later reloads the record and calls
/// [`AttachmentType::process`](crate::AttachmentType::process) for it.
#[async_trait]
pub trait ProcessingQueue: Send + Sync {
    async fn enqueue(&self, attachment_type: &str, id: i64) -> AttachmentResult<()>;
}

/// Queue that only logs. Hosts without a job system leave queued records unprocessed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingQueue;

#[async_trait]
impl ProcessingQueue for LoggingQueue {
    async fn enqueue(&self, attachment_type: &str, id: i64) -> AttachmentResult<()> {
        tracing::info!(
            attachment_type = %attachment_type,
            attachment_id = id,
            "Attachment queued for processing"
        );
        Ok(())
    }
}
