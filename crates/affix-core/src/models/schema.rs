//! Optional columns an attachment type's table provides.

use serde::{Deserialize, Serialize};

/// Capabilities of an attachment type, declared once when the type is defined.
///
/// Processing and storage consult these flags instead of inspecting records at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    /// `processed_at` timestamp column
    pub processed_at: bool,
    /// `task_progress` column
    pub task_progress: bool,
    /// `width` and `height` columns
    pub dimensions: bool,
    /// `parent_id` and `thumbnail` columns
    pub thumbnails: bool,
    /// `stores` column
    pub stores: bool,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            processed_at: false,
            task_progress: true,
            dimensions: true,
            thumbnails: true,
            stores: true,
        }
    }
}

impl Schema {
    /// A table with only the required `filename`, `content_type` and `size` columns.
    pub fn minimal() -> Self {
        Self {
            processed_at: false,
            task_progress: false,
            dimensions: false,
            thumbnails: false,
            stores: false,
        }
    }

    pub fn tracks_progress(&self) -> bool {
        self.task_progress
    }
}
