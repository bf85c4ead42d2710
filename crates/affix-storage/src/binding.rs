//! Named store bindings configured per attachment type.

use crate::keys::KeyLayout;
use affix_core::StoreKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Who may read objects written by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    #[default]
    Private,
    PublicRead,
    AuthenticatedRead,
}

/// Binds a store name to a backend kind and its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreBinding {
    pub name: String,
    pub kind: StoreKind,
    /// Leading key segment. Defaults to the attachment type name.
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub access: AccessPolicy,
    /// Env var prefix holding `{PREFIX}_ACCESS_KEY_ID` and `{PREFIX}_SECRET_ACCESS_KEY`.
    #[serde(default)]
    pub credentials: Option<String>,
    /// Filesystem root. Defaults to the configured local storage path.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub layout: Option<KeyLayout>,
    #[serde(default)]
    pub default: bool,
    /// Per-store bound on a multi-store save, in milliseconds.
    #[serde(default)]
    pub save_timeout_ms: Option<u64>,
}

impl StoreBinding {
    pub fn new(name: impl Into<String>, kind: StoreKind) -> Self {
        Self {
            name: name.into(),
            kind,
            path_prefix: None,
            bucket: None,
            access: AccessPolicy::default(),
            credentials: None,
            root: None,
            layout: None,
            default: false,
            save_timeout_ms: None,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_save_timeout(mut self, timeout: Duration) -> Self {
        self.save_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Filesystem stores partition by id, remote stores use flat keys.
    pub fn layout(&self) -> KeyLayout {
        self.layout.unwrap_or(match self.kind {
            StoreKind::FileSystem => KeyLayout::Partitioned,
            StoreKind::Remote | StoreKind::DbFile => KeyLayout::Flat,
        })
    }

    pub fn save_timeout(&self, fallback: Duration) -> Duration {
        self.save_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(fallback)
    }
}
