//! Process-wide task name table.

use super::{remote_sync, resize, thumbnails, Task, TaskChain, TaskOptions};
use affix_core::{AttachmentError, AttachmentResult};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

/// Builds a task instance for the chain it is queued in.
pub type TaskConstructor =
    Arc<dyn Fn(&mut TaskChain, &TaskOptions) -> AttachmentResult<Arc<dyn Task>> + Send + Sync>;

/// Defines one or more tasks in the table when first needed.
pub type TaskLoader = fn(&mut TaskTable);

#[derive(Clone)]
pub enum TaskImpl {
    /// Instantiated per queued use with the owning chain and options.
    Constructor(TaskConstructor),
    /// A ready instance shared by every use.
    Callable(Arc<dyn Task>),
}

impl TaskImpl {
    pub fn constructor<F>(f: F) -> Self
    where
        F: Fn(&mut TaskChain, &TaskOptions) -> AttachmentResult<Arc<dyn Task>>
            + Send
            + Sync
            + 'static,
    {
        TaskImpl::Constructor(Arc::new(f))
    }

    pub fn callable(task: impl Task + 'static) -> Self {
        TaskImpl::Callable(Arc::new(task))
    }
}

enum TaskEntry {
    Deferred(TaskLoader),
    Resolved(TaskImpl),
}

/// Entries of a [`TaskRegistry`]. Loaders receive it to define what they provide.
#[derive(Default)]
pub struct TaskTable {
    entries: HashMap<String, TaskEntry>,
}

impl TaskTable {
    /// Define `name`, replacing any deferred entry.
    pub fn define(&mut self, name: impl Into<String>, implementation: TaskImpl) {
        self.entries
            .insert(name.into(), TaskEntry::Resolved(implementation));
    }
}

static GLOBAL: LazyLock<Arc<TaskRegistry>> =
    LazyLock::new(|| Arc::new(TaskRegistry::with_builtins()));

/// Maps task names to implementations, loading deferred entries on first use.
#[derive(Default)]
pub struct TaskRegistry {
    table: Mutex<TaskTable>,
}

impl TaskRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in tasks registered as deferred entries.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        let mut table = registry.lock_table();
        for (name, loader) in [
            ("resize", resize::load as TaskLoader),
            ("get_image_size", resize::load),
            ("thumbnails", thumbnails::load),
            ("remote_sync", remote_sync::load),
        ] {
            table
                .entries
                .insert(name.to_string(), TaskEntry::Deferred(loader));
        }
        drop(table);
        registry
    }

    /// The process-wide registry, created with the built-ins on first use.
    pub fn global() -> Arc<TaskRegistry> {
        GLOBAL.clone()
    }

    /// Register `name`. An implementation wins over a loader; passing neither is an error.
    pub fn register(
        &self,
        name: impl Into<String>,
        implementation: Option<TaskImpl>,
        loader: Option<TaskLoader>,
    ) -> AttachmentResult<()> {
        let name = name.into();
        let entry = match (implementation, loader) {
            (Some(implementation), _) => TaskEntry::Resolved(implementation),
            (None, Some(loader)) => TaskEntry::Deferred(loader),
            (None, None) => {
                return Err(AttachmentError::Configuration(format!(
                    "task `{}` needs an implementation or a loader",
                    name
                )))
            }
        };

        tracing::debug!(task = %name, deferred = matches!(entry, TaskEntry::Deferred(_)), "Task registered");
        self.lock_table().entries.insert(name, entry);
        Ok(())
    }

    /// Look up `name`, running its loader once if it is deferred.
    pub fn resolve(&self, name: &str) -> AttachmentResult<TaskImpl> {
        let mut table = self.lock_table();

        let loader = match table.entries.get(name) {
            Some(TaskEntry::Resolved(implementation)) => return Ok(implementation.clone()),
            Some(TaskEntry::Deferred(loader)) => *loader,
            None => {
                return Err(AttachmentError::InvalidKey(format!(
                    "no task registered as `{}`",
                    name
                )))
            }
        };

        // the lock is held so concurrent resolvers load once
        loader(&mut table);

        match table.entries.get(name) {
            Some(TaskEntry::Resolved(implementation)) => {
                tracing::debug!(task = %name, "Deferred task loaded");
                Ok(implementation.clone())
            }
            _ => Err(AttachmentError::Configuration(format!(
                "loading task `{}` did not define it",
                name
            ))),
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock_table().entries.contains_key(name)
    }

    fn lock_table(&self) -> MutexGuard<'_, TaskTable> {
        // entries stay consistent even if a loader panicked
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskContext;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    #[async_trait]
    impl Task for Noop {
        async fn call(&self, _ctx: &mut TaskContext<'_>, _options: &TaskOptions) -> anyhow::Result<()> {
            Ok(())
        }
    }

    static LOADS: AtomicUsize = AtomicUsize::new(0);

    fn load_counted(table: &mut TaskTable) {
        LOADS.fetch_add(1, Ordering::SeqCst);
        table.define("counted", TaskImpl::callable(Noop));
    }

    fn load_nothing(_table: &mut TaskTable) {}

    #[test]
    fn test_register_requires_something() {
        let registry = TaskRegistry::new();
        assert!(matches!(
            registry.register("empty", None, None),
            Err(AttachmentError::Configuration(_))
        ));
        assert!(!registry.is_registered("empty"));
    }

    #[test]
    fn test_deferred_entry_loads_once() {
        let registry = TaskRegistry::new();
        registry.register("counted", None, Some(load_counted)).unwrap();

        registry.resolve("counted").unwrap();
        registry.resolve("counted").unwrap();
        assert_eq!(LOADS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_loader_must_define_task() {
        let registry = TaskRegistry::new();
        registry.register("broken", None, Some(load_nothing)).unwrap();
        assert!(matches!(
            registry.resolve("broken"),
            Err(AttachmentError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_task() {
        let registry = TaskRegistry::new();
        assert!(matches!(
            registry.resolve("missing"),
            Err(AttachmentError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_builtins_share_resize_loader() {
        let registry = TaskRegistry::with_builtins();
        assert!(matches!(
            registry.resolve("get_image_size").unwrap(),
            TaskImpl::Callable(_)
        ));
        assert!(matches!(
            registry.resolve("resize").unwrap(),
            TaskImpl::Constructor(_)
        ));
        assert!(registry.resolve("thumbnails").is_ok());
        assert!(registry.resolve("remote_sync").is_ok());
    }
}
