//! Shared key generation for attachment stores.

use crate::traits::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// Width of the zero-padded id used by partitioned keys.
const PARTITION_WIDTH: usize = 8;
/// Digits per directory level.
const PARTITION_GROUP: usize = 4;

/// How a record id maps to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyLayout {
    /// `{prefix}/0000/0042/{filename}` to bound directory fan-out
    Partitioned,
    /// `{prefix}/42/{filename}`
    Flat,
}

/// Directory groups for `id`: 42 becomes `["0000", "0042"]`.
pub fn partition(id: i64) -> Vec<String> {
    let padded = format!("{:0width$}", id, width = PARTITION_WIDTH);
    padded
        .as_bytes()
        .chunks(PARTITION_GROUP)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

/// Build the key of `filename` for record `id`.
pub fn attachment_key(
    prefix: &str,
    layout: KeyLayout,
    id: i64,
    filename: &str,
) -> StorageResult<String> {
    let mut segments: Vec<String> = Vec::new();
    let prefix = prefix.trim_matches('/');
    if !prefix.is_empty() {
        segments.push(prefix.to_string());
    }
    match layout {
        KeyLayout::Partitioned => segments.extend(partition(id)),
        KeyLayout::Flat => segments.push(id.to_string()),
    }
    segments.push(filename.to_string());

    let key = segments.join("/");
    validate_key(&key)?;
    Ok(key)
}

/// Keys must not escape the store root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
