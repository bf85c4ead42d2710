//! Declared store set of an attachment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Names of the stores believed to hold a copy of an attachment's bytes.
///
/// Persisted as a comma-delimited string. Iteration order is sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSet(BTreeSet<String>);

impl StoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-delimited column value. Blank entries are ignored.
    pub fn parse(value: &str) -> Self {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn insert(&mut self, store: impl Into<String>) -> bool {
        self.0.insert(store.into())
    }

    pub fn remove(&mut self, store: &str) -> bool {
        self.0.remove(store)
    }

    pub fn contains(&self, store: &str) -> bool {
        self.0.contains(store)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Stores in `self` that are not in `other`.
    pub fn difference<'a>(&'a self, other: &'a StoreSet) -> impl Iterator<Item = &'a str> {
        self.0.difference(&other.0).map(String::as_str)
    }
}

impl fmt::Display for StoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(","))
    }
}

impl<S: Into<String>> FromIterator<S> for StoreSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        StoreSet(iter.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for StoreSet {
    fn from(value: &str) -> Self {
        StoreSet::parse(value)
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for StoreSet {
    fn from(value: [S; N]) -> Self {
        value.into_iter().collect()
    }
}

impl From<Vec<String>> for StoreSet {
    fn from(value: Vec<String>) -> Self {
        value.into_iter().collect()
    }
}
