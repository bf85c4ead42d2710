//! Processing state machine
//!
//! Runs an attachment type's task chain against one attachment. Which entries run depends on
//! the columns the type's table provides:
//!
//! - `processed_at`: nothing runs once the timestamp is set
//! - `task_progress`: each entry runs until it is recorded as done
//! - neither: entries run only for attachments created by this instance
//!
//! A failed entry on a progress-tracked record is recorded and halts the chain. Without
//! progress tracking the failure propagates.

use crate::attachment_type::AttachmentType;
use crate::tasks::{TaskContext, TaskOptions};
use affix_core::{Attachment, AttachmentError, AttachmentResult, ProcessingState, TaskFailure};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Leave persisting the record to the caller.
    pub skip_save: bool,
}

impl ProcessOptions {
    pub fn without_save() -> Self {
        Self { skip_save: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The attachment was already processed.
    Skipped,
    Completed,
    /// The entry under `key` failed; later entries did not run.
    Halted { key: String, failure: TaskFailure },
}

impl AttachmentType {
    /// Whether processing has finished for this attachment.
    pub fn is_processed(&self, attachment: &Attachment) -> bool {
        (self.schema.processed_at && attachment.record.processed_at.is_some())
            || (self.schema.task_progress && attachment.record.task_progress.is_complete())
    }

    fn should_run(&self, attachment: &Attachment, key: &str) -> bool {
        if self.schema.processed_at {
            attachment.record.processed_at.is_none()
                && !(self.schema.task_progress && attachment.record.task_progress.is_done(key))
        } else if self.schema.task_progress {
            !attachment.record.task_progress.is_done(key)
        } else {
            attachment.is_new_attachment()
        }
    }

    /// Run the task chain against `attachment`.
    pub fn process<'a>(
        &'a self,
        attachment: &'a mut Attachment,
        options: ProcessOptions,
    ) -> BoxFuture<'a, AttachmentResult<ProcessOutcome>> {
        async move {
            if self.is_processed(attachment) {
                attachment.state = ProcessingState::Complete;
                return Ok(ProcessOutcome::Skipped);
            }

            let start = Instant::now();
            attachment.state = ProcessingState::Processing;
            let tracks_progress = self.schema.task_progress;

            for entry in self.chain.iter() {
                let key = entry.progress_key();
                if !self.should_run(attachment, &key) {
                    tracing::debug!(attachment_id = ?attachment.id(), task = %key, "Task already done");
                    continue;
                }

                let task_start = Instant::now();
                let result = {
                    let mut ctx = TaskContext::new(attachment, self);
                    entry.task.call(&mut ctx, &entry.options).await
                };

                match result {
                    Ok(()) => {
                        tracing::debug!(
                            attachment_id = ?attachment.id(),
                            task = %key,
                            duration_ms = task_start.elapsed().as_secs_f64() * 1000.0,
                            "Task completed"
                        );
                        if tracks_progress {
                            attachment.record.task_progress.mark_done(key);
                        }
                    }
                    Err(error) => {
                        let failure = TaskFailure::capture(&entry.name, &error);
                        if !tracks_progress {
                            tracing::error!(
                                attachment_id = ?attachment.id(),
                                task = %key,
                                error = %failure,
                                "Task failed"
                            );
                            attachment.state = ProcessingState::Failed;
                            return Err(AttachmentError::Task(failure));
                        }

                        tracing::warn!(
                            attachment_id = ?attachment.id(),
                            task = %key,
                            error = %failure,
                            "Task failed, halting chain"
                        );
                        attachment
                            .record
                            .task_progress
                            .mark_failed(key.clone(), failure.clone());
                        attachment.state = ProcessingState::Unprocessed;
                        if !options.skip_save {
                            self.save(attachment).await?;
                        }
                        return Ok(ProcessOutcome::Halted { key, failure });
                    }
                }
            }

            if self.schema.processed_at {
                attachment.record.processed_at = Some(Utc::now());
            }
            if tracks_progress {
                attachment.record.task_progress.complete();
            }
            attachment.state = ProcessingState::Complete;

            tracing::info!(
                attachment_type = %self.name,
                attachment_id = ?attachment.id(),
                tasks = self.chain.len(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Attachment processed"
            );

            if !options.skip_save && !self.save(attachment).await? {
                tracing::warn!(
                    attachment_id = ?attachment.id(),
                    errors = ?attachment.errors,
                    "Processed attachment failed validation"
                );
            }
            Ok(ProcessOutcome::Completed)
        }
        .boxed()
    }

    /// Run a task this type has loaded, with `task_options`, outside the queued chain.
    ///
    /// Progress is neither consulted nor recorded and failures propagate. A name the chain has
    /// not loaded is an `InvalidKey` error.
    pub async fn process_task(
        &self,
        attachment: &mut Attachment,
        name: &str,
        task_options: TaskOptions,
        options: ProcessOptions,
    ) -> AttachmentResult<()> {
        let task = self.chain.task_named(name)?.clone();

        let result = {
            let mut ctx = TaskContext::new(attachment, self);
            task.call(&mut ctx, &task_options).await
        };
        result.map_err(|e| AttachmentError::Task(TaskFailure::capture(name, &e)))?;

        tracing::debug!(attachment_id = ?attachment.id(), task = %name, "Task run on demand");

        if !options.skip_save {
            self.save(attachment).await?;
        }
        attachment.clear_temp_paths();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{Task, TaskImpl, TaskRegistry};
    use affix_core::{AffixConfig, Schema, Upload};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Task for Counting {
        async fn call(&self, _ctx: &mut TaskContext<'_>, _options: &TaskOptions) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn registry(calls: &Arc<AtomicUsize>) -> Arc<TaskRegistry> {
        let registry = TaskRegistry::new();
        registry
            .register(
                "count",
                Some(TaskImpl::callable(Counting {
                    calls: calls.clone(),
                    fail: false,
                })),
                None,
            )
            .unwrap();
        registry
            .register(
                "explode",
                Some(TaskImpl::callable(Counting {
                    calls: calls.clone(),
                    fail: true,
                })),
                None,
            )
            .unwrap();
        Arc::new(registry)
    }

    async fn kind(
        dir: &std::path::Path,
        schema: Schema,
        registry: Arc<TaskRegistry>,
        tasks: &'static [&'static str],
    ) -> AttachmentType {
        AttachmentType::builder("docs")
            .schema(Schema {
                dimensions: false,
                ..schema
            })
            .registry(registry)
            .config(AffixConfig {
                temp_dir: dir.to_path_buf(),
                ..Default::default()
            })
            .configure(move |chain| {
                for (i, name) in tasks.iter().enumerate() {
                    chain.task(name, TaskOptions::new().with("n", i as u64))?;
                }
                Ok(())
            })
            .build()
            .await
            .unwrap()
    }

    async fn uploaded(kind: &AttachmentType) -> Attachment {
        let mut attachment = Attachment::new();
        kind.set_upload(
            &mut attachment,
            Upload::from_bytes(&b"data"[..])
                .with_filename("a.txt")
                .with_content_type("text/plain"),
        )
        .await
        .unwrap();
        attachment
    }

    #[tokio::test]
    async fn test_progress_makes_reprocessing_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let kind = kind(dir.path(), Schema::default(), registry(&calls), &["count", "count"]).await;

        let mut attachment = uploaded(&kind).await;
        kind.save(&mut attachment).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(kind.is_processed(&attachment));
        assert_eq!(attachment.state, ProcessingState::Complete);

        let outcome = kind
            .process(&mut attachment, ProcessOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stored = kind.repository().find(attachment.id().unwrap()).await.unwrap().unwrap();
        assert!(stored.task_progress.is_complete());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_halts() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let kind = kind(
            dir.path(),
            Schema::default(),
            registry(&calls),
            &["count", "explode", "count"],
        )
        .await;

        let mut attachment = uploaded(&kind).await;
        kind.save(&mut attachment).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(attachment.state, ProcessingState::Unprocessed);

        let stored = kind.repository().find(attachment.id().unwrap()).await.unwrap().unwrap();
        assert!(stored.task_progress.is_done(r#"count:{"n":0}"#));
        let failure = stored.task_progress.failure(r#"explode:{"n":1}"#).unwrap();
        assert_eq!(failure.message, "boom");
        assert!(!stored.task_progress.is_done(r#"count:{"n":2}"#));

        // the retry skips the recorded success and halts on the same entry again
        let mut reloaded = kind.reload(attachment.id().unwrap()).await.unwrap();
        let outcome = kind
            .process(&mut reloaded, ProcessOptions::without_save())
            .await
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Halted { ref key, .. } if key == r#"explode:{"n":1}"#));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_propagates_without_progress() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let kind = kind(dir.path(), Schema::minimal(), registry(&calls), &["explode", "count"]).await;

        let mut attachment = uploaded(&kind).await;
        let result = kind.save(&mut attachment).await;
        assert!(matches!(result, Err(AttachmentError::Task(ref f)) if f.task == "explode"));
        assert_eq!(attachment.state, ProcessingState::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_processed_at_gates_whole_chain() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let schema = Schema {
            processed_at: true,
            task_progress: false,
            ..Schema::default()
        };
        let kind = kind(dir.path(), schema, registry(&calls), &["count"]).await;

        let mut attachment = uploaded(&kind).await;
        kind.save(&mut attachment).await.unwrap();
        assert!(attachment.record.processed_at.is_some());

        let mut reloaded = kind.reload(attachment.id().unwrap()).await.unwrap();
        let outcome = kind
            .process(&mut reloaded, ProcessOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_without_tracking_only_new_attachments_run() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let kind = kind(dir.path(), Schema::minimal(), registry(&calls), &["count"]).await;

        let mut attachment = uploaded(&kind).await;
        kind.save(&mut attachment).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // still new in memory, so it runs again
        kind.process(&mut attachment, ProcessOptions::without_save())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let mut reloaded = kind.reload(attachment.id().unwrap()).await.unwrap();
        kind.process(&mut reloaded, ProcessOptions::without_save())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_process_task_ignores_progress() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let kind = kind(dir.path(), Schema::default(), registry(&calls), &["count"]).await;

        let mut attachment = uploaded(&kind).await;
        kind.save(&mut attachment).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        kind.process_task(&mut attachment, "count", TaskOptions::new(), ProcessOptions::default())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_process_task_runs_loaded_instances_only() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let kind = AttachmentType::builder("docs")
            .schema(Schema::minimal())
            .registry(registry(&calls))
            .config(AffixConfig {
                temp_dir: dir.path().to_path_buf(),
                ..Default::default()
            })
            .configure(|chain| {
                chain.load("explode", TaskOptions::new())?;
                Ok(())
            })
            .build()
            .await
            .unwrap();
        assert!(kind.chain().is_empty());

        let mut attachment = uploaded(&kind).await;

        // loaded but not queued: runs on demand
        let result = kind
            .process_task(&mut attachment, "explode", TaskOptions::new(), ProcessOptions::without_save())
            .await;
        assert!(matches!(result, Err(AttachmentError::Task(ref f)) if f.task == "explode"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // registered but never loaded by this type
        let result = kind
            .process_task(&mut attachment, "count", TaskOptions::new(), ProcessOptions::without_save())
            .await;
        assert!(matches!(result, Err(AttachmentError::InvalidKey(_))));
        assert!(matches!(
            kind.process_task(&mut attachment, "missing", TaskOptions::new(), ProcessOptions::without_save())
                .await,
            Err(AttachmentError::InvalidKey(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
