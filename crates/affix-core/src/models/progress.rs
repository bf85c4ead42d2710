//! Per-record task progress.

use crate::constants::PROGRESS_COMPLETE_KEY;
use crate::error::TaskFailure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome recorded for one stack entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Done,
    Failed(TaskFailure),
}

/// Map from a stack entry's progress key to its recorded outcome.
///
/// Once every task succeeded the map collapses to the single `complete` sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskProgress(BTreeMap<String, TaskOutcome>);

impl TaskProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.0.get(PROGRESS_COMPLETE_KEY), Some(TaskOutcome::Done))
    }

    /// True if the entry, or the whole chain, is already done.
    pub fn is_done(&self, key: &str) -> bool {
        self.is_complete() || matches!(self.0.get(key), Some(TaskOutcome::Done))
    }

    pub fn failure(&self, key: &str) -> Option<&TaskFailure> {
        match self.0.get(key) {
            Some(TaskOutcome::Failed(failure)) => Some(failure),
            _ => None,
        }
    }

    pub fn mark_done(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), TaskOutcome::Done);
    }

    pub fn mark_failed(&mut self, key: impl Into<String>, failure: TaskFailure) {
        self.0.insert(key.into(), TaskOutcome::Failed(failure));
    }

    /// Replace every entry with the `complete` sentinel.
    pub fn complete(&mut self) {
        self.0.clear();
        self.0.insert(PROGRESS_COMPLETE_KEY.to_string(), TaskOutcome::Done);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(value: &str) -> serde_json::Result<Self> {
        serde_json::from_str(value)
    }
}
