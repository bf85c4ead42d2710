//! Filename sanitizing and record-level validation.
//!
//! Validation failures are returned as values so hosts can surface them next to the
//! record instead of treating them as errors.

use crate::constants::{
    DEFAULT_MAX_SIZE_BYTES, DEFAULT_MIN_SIZE_BYTES, IMAGE_CONTENT_TYPES, IMAGE_CONTENT_TYPE_TOKEN,
};
use crate::models::AttachmentRecord;
use std::fmt;
use std::ops::RangeInclusive;

/// Sanitize an uploaded filename: strip whitespace, drop any directory part (both `/` and
/// `\` separators) and replace every character outside `[A-Za-z0-9.-_]` with `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let trimmed = filename.trim();
    let basename = trimmed
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(trimmed);

    basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A single record-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// Upload constraints configured per attachment type.
#[derive(Debug, Clone)]
pub struct AttachmentRules {
    content_types: Option<Vec<String>>,
    size_range: RangeInclusive<i64>,
}

impl Default for AttachmentRules {
    fn default() -> Self {
        Self {
            content_types: None,
            size_range: DEFAULT_MIN_SIZE_BYTES..=DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

impl AttachmentRules {
    /// Build rules from an optional allow list. The token `image` expands to every known
    /// image content type.
    pub fn new(content_types: Option<Vec<String>>, size_range: RangeInclusive<i64>) -> Self {
        let content_types = content_types.map(|types| {
            let mut expanded = Vec::with_capacity(types.len());
            for content_type in types {
                if content_type == IMAGE_CONTENT_TYPE_TOKEN {
                    expanded.extend(IMAGE_CONTENT_TYPES.iter().map(|t| t.to_string()));
                } else {
                    expanded.push(content_type.trim().to_lowercase());
                }
            }
            expanded
        });

        Self {
            content_types,
            size_range,
        }
    }

    pub fn content_types(&self) -> Option<&[String]> {
        self.content_types.as_deref()
    }

    pub fn size_range(&self) -> &RangeInclusive<i64> {
        &self.size_range
    }

    /// Validate a record against these rules.
    pub fn validate(&self, record: &AttachmentRecord) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if record.filename.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::new("filename", "can't be blank"));
        }

        match record.size {
            None => errors.push(ValidationError::new("size", "can't be blank")),
            Some(size) if !self.size_range.contains(&size) => errors.push(ValidationError::new(
                "size",
                format!(
                    "must be between {} and {} bytes",
                    self.size_range.start(),
                    self.size_range.end()
                ),
            )),
            Some(_) => {}
        }

        match record.content_type.as_deref() {
            None | Some("") => errors.push(ValidationError::new("content_type", "can't be blank")),
            Some(content_type) => {
                if let Some(allowed) = &self.content_types {
                    let content_type = content_type.to_lowercase();
                    if !allowed.iter().any(|t| *t == content_type) {
                        errors.push(ValidationError::new(
                            "content_type",
                            format!("{} is not included in the list", content_type),
                        ));
                    }
                }
            }
        }

        errors
    }
}
