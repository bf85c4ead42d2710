//! Processing tasks
//!
//! A task is a named step run against one attachment. Tasks are registered by name in a
//! [`TaskRegistry`] and queued per attachment type in a [`TaskChain`].

pub mod chain;
pub mod registry;
pub mod remote_sync;
pub mod resize;
pub mod thumbnails;

pub use chain::{StackEntry, TaskChain};
pub use registry::{TaskConstructor, TaskImpl, TaskLoader, TaskRegistry, TaskTable};

use crate::attachment_type::AttachmentType;
use affix_core::{Attachment, AttachmentError, AttachmentResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A processing step.
///
/// Errors are opaque to the pipeline: they are captured into the record's task progress, or
/// propagated when the type does not track progress.
#[async_trait]
pub trait Task: Send + Sync {
    async fn call(&self, ctx: &mut TaskContext<'_>, options: &TaskOptions) -> anyhow::Result<()>;
}

/// What a task runs against: the attachment and the type it belongs to.
pub struct TaskContext<'a> {
    pub attachment: &'a mut Attachment,
    pub kind: &'a AttachmentType,
}

impl<'a> TaskContext<'a> {
    pub fn new(attachment: &'a mut Attachment, kind: &'a AttachmentType) -> Self {
        Self { attachment, kind }
    }

    /// Local path of the bytes tasks should read, materializing stored data if needed.
    pub async fn working_copy(&mut self) -> AttachmentResult<PathBuf> {
        self.kind.working_copy(self.attachment).await
    }
}

/// Options a task was queued with: a JSON object.
///
/// [`TaskOptions::canonical`] is stable across processes and is used in progress keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskOptions(Map<String, Value>);

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value, which must be an object or null.
    pub fn from_value(value: Value) -> AttachmentResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(AttachmentError::Configuration(format!(
                "task options must be an object, got {}",
                other
            ))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Deserialize the value under `key`, if present.
    pub fn parse<T: DeserializeOwned>(&self, key: &str) -> serde_json::Result<Option<T>> {
        self.0
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
    }

    /// Deserialize the required value under `key`.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<T> {
        self.parse(key)?
            .ok_or_else(|| anyhow::anyhow!("missing required option `{}`", key))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical JSON form, keys sorted.
    pub fn canonical(&self) -> String {
        let sorted: BTreeMap<&String, &Value> = self.0.iter().collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    }
}

impl From<Map<String, Value>> for TaskOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_form_sorts_keys() {
        let a = TaskOptions::new().with("to", "40x40").with("with", "raster");
        let b = TaskOptions::new().with("with", "raster").with("to", "40x40");
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), r#"{"to":"40x40","with":"raster"}"#);
    }

    #[test]
    fn test_accessors() {
        let options =
            TaskOptions::from_value(json!({"to": "50x50", "skip_size": true, "a": 3})).unwrap();
        assert_eq!(options.str("to"), Some("50x50"));
        assert!(options.flag("skip_size"));
        assert!(!options.flag("missing"));
        assert_eq!(options.u64("a"), Some(3));
        assert!(options.require::<String>("missing").is_err());
    }

    #[test]
    fn test_options_must_be_an_object() {
        assert!(TaskOptions::from_value(json!(null)).unwrap().is_empty());
        assert!(TaskOptions::from_value(json!([1, 2])).is_err());
    }
}
