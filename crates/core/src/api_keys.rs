//! Process-wide API key cache.
//!
//! The whole `key -> entry` map is swapped atomically: `replace` publishes a fully built snapshot and
//! readers load whichever snapshot is current without taking a lock.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
    pub label: Option<String>,
}

#[derive(Debug)]
pub struct ApiKeyCache {
    snapshot: ArcSwap<HashMap<String, ApiKeyEntry>>,
}

impl Default for ApiKeyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiKeyCache {
    pub fn new() -> Self {
        Self { snapshot: ArcSwap::from_pointee(HashMap::new()) }
    }

    /// Publishes a new snapshot and returns how many keys it holds.
    pub fn replace(&self, entries: impl IntoIterator<Item = ApiKeyEntry>) -> usize {
        let map: HashMap<String, ApiKeyEntry> = entries
            .into_iter()
            .filter(|entry| !entry.key.trim().is_empty())
            .map(|entry| (entry.key.clone(), entry))
            .collect();
        let count = map.len();
        self.snapshot.store(Arc::new(map));
        count
    }

    pub fn lookup(&self, key: &str) -> Option<ApiKeyEntry> {
        self.snapshot.load().get(key.trim()).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
