use super::{Task, TaskImpl, TaskOptions, TaskRegistry};
use affix_core::{AttachmentError, AttachmentResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One queued task.
#[derive(Clone)]
pub struct StackEntry {
    pub name: String,
    pub task: Arc<dyn Task>,
    pub options: TaskOptions,
}

impl StackEntry {
    /// Key recording this entry in a record's task progress: the task name and its options.
    pub fn progress_key(&self) -> String {
        if self.options.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, self.options.canonical())
        }
    }
}

impl fmt::Debug for StackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackEntry")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish()
    }
}

/// Ordered tasks an attachment type runs, plus every task instance it has loaded.
///
/// Copies made with [`TaskChain::copy_for`] share task instances but never the stack or
/// index, so a derived type can change its chain without touching the original.
#[derive(Clone)]
pub struct TaskChain {
    owner: String,
    registry: Arc<TaskRegistry>,
    stack: Vec<StackEntry>,
    index: BTreeMap<String, Arc<dyn Task>>,
}

impl TaskChain {
    pub fn new(owner: impl Into<String>, registry: Arc<TaskRegistry>) -> Self {
        Self {
            owner: owner.into(),
            registry,
            stack: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Queue `name` at the end of the stack.
    pub fn task(&mut self, name: &str, options: TaskOptions) -> AttachmentResult<Arc<dyn Task>> {
        let task = self.load(name, options.clone())?;
        self.stack.push(StackEntry {
            name: name.to_string(),
            task: task.clone(),
            options,
        });
        Ok(task)
    }

    /// Instantiate `name` and index it without queueing it.
    pub fn load(&mut self, name: &str, options: TaskOptions) -> AttachmentResult<Arc<dyn Task>> {
        let task = match self.registry.resolve(name)? {
            TaskImpl::Constructor(construct) => construct(self, &options)?,
            TaskImpl::Callable(task) => task,
        };
        self.index.insert(name.to_string(), task.clone());
        Ok(task)
    }

    /// Queue `name` at the front of the stack.
    pub fn prepend(&mut self, name: &str, options: TaskOptions) -> AttachmentResult<Arc<dyn Task>> {
        let task = self.load(name, options.clone())?;
        self.stack.insert(
            0,
            StackEntry {
                name: name.to_string(),
                task: task.clone(),
                options,
            },
        );
        Ok(task)
    }

    /// Remove the indexed instance of `name` and every stack entry running it.
    ///
    /// Returns false when `name` was not indexed.
    pub fn delete(&mut self, name: &str) -> bool {
        let Some(task) = self.index.remove(name) else {
            return false;
        };
        let target = instance_ptr(&task);
        self.stack.retain(|entry| instance_ptr(&entry.task) != target);
        true
    }

    pub fn clear(&mut self) {
        self.stack.clear();
        self.index.clear();
    }

    /// A copy owned by `owner`. Stack and index are duplicated, task instances are shared.
    pub fn copy_for(&self, owner: impl Into<String>) -> TaskChain {
        TaskChain {
            owner: owner.into(),
            registry: self.registry.clone(),
            stack: self.stack.clone(),
            index: self.index.clone(),
        }
    }

    pub fn task_named(&self, name: &str) -> AttachmentResult<&Arc<dyn Task>> {
        self.index.get(name).ok_or_else(|| {
            AttachmentError::InvalidKey(format!("task `{}` is not loaded in {}", name, self.owner))
        })
    }

    pub fn entry_at(&self, position: usize) -> AttachmentResult<&StackEntry> {
        self.stack.get(position).ok_or_else(|| {
            AttachmentError::InvalidKey(format!(
                "no task at position {} in {} ({} queued)",
                position,
                self.owner,
                self.stack.len()
            ))
        })
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StackEntry> {
        self.stack.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stack.iter().map(|e| e.name.as_str()).collect()
    }
}

impl fmt::Debug for TaskChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskChain")
            .field("owner", &self.owner)
            .field("stack", &self.stack)
            .field("index", &self.index.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn instance_ptr(task: &Arc<dyn Task>) -> *const () {
    Arc::as_ptr(task) as *const ()
}
