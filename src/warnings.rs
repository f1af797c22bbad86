//! # Warnings
//!
//! Resource-scoped diagnostics collected during compilation. They are
//! surfaced to the caller for event reporting and never abort a compile.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::ResourceKey;

/// Multimap from the originating resource to its warning messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warnings {
    entries: BTreeMap<ResourceKey, Vec<String>>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &ResourceKey, message: impl Into<String>) {
        self.entries.entry(key.clone()).or_default().push(message.into());
    }

    /// Merge another set of warnings into this one, appending messages
    pub fn extend(&mut self, other: Warnings) {
        for (key, messages) in other.entries {
            self.entries.entry(key).or_default().extend(messages);
        }
    }

    pub fn get(&self, key: &ResourceKey) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of messages across all resources
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &Vec<String>)> {
        self.entries.iter()
    }
}

impl IntoIterator for Warnings {
    type Item = (ResourceKey, Vec<String>);
    type IntoIter = std::collections::btree_map::IntoIter<ResourceKey, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
