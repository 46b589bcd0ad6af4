//! In-memory keyed document container
//!
//! One `KeyedStore` holds every document of a collection, keyed by id.
//! Absence is reported through `Option`/`bool`, never through an error.

use ahash::AHashMap;

use crate::document::DocumentId;

#[derive(Debug, Clone)]
pub struct KeyedStore<V> {
    entries: AHashMap<DocumentId, V>,
}

impl<V> KeyedStore<V> {
    pub fn new() -> Self {
        KeyedStore {
            entries: AHashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        KeyedStore {
            entries: AHashMap::with_capacity(capacity),
        }
    }

    /// Insert or overwrite; returns the previous value
    pub fn put(&mut self, id: DocumentId, value: V) -> Option<V> {
        self.entries.insert(id, value)
    }

    pub fn get(&self, id: &str) -> Option<&V> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove and return the value stored under `id`
    pub fn take(&mut self, id: &str) -> Option<V> {
        self.entries.remove(id)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.take(id).is_some()
    }

    /// All (id, value) pairs
    ///
    /// The order is arbitrary but does not change between calls while the
    /// store is not modified.
    pub fn items(&self) -> impl Iterator<Item = (&DocumentId, &V)> {
        self.entries.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<V> Default for KeyedStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(DocumentId, V)> for KeyedStore<V> {
    fn from_iter<I: IntoIterator<Item = (DocumentId, V)>>(iter: I) -> Self {
        KeyedStore {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_overwrite() {
        let mut store = KeyedStore::new();
        assert!(store.put(DocumentId::new("a"), 1).is_none());
        assert_eq!(store.put(DocumentId::new("a"), 2), Some(1));
        assert_eq!(store.get("a"), Some(&2));
        assert_eq!(store.get("missing"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_reports_presence() {
        let mut store = KeyedStore::new();
        store.put(DocumentId::new("a"), "x");
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_items_stable_between_calls() {
        let store: KeyedStore<usize> = (0..50)
            .map(|i| (DocumentId::new(format!("id-{}", i)), i))
            .collect();
        let first: Vec<_> = store.items().map(|(k, _)| k.clone()).collect();
        let second: Vec<_> = store.items().map(|(k, _)| k.clone()).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 50);
    }
}
