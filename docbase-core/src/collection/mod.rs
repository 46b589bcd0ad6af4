// src/collection/mod.rs
//! Collection: one keyed document store plus its secondary indexes
//!
//! Every mutation keeps the indexes in step with the store before it
//! returns. Persistence is explicit: `save` writes the documents,
//! `save_indexes`/`save_index` write the index files, and loading indexes
//! is a separate step from loading documents.

mod index_persistence;
mod persistence;

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use index_persistence::CatalogEntry;

use crate::document::{Document, DocumentId};
use crate::error::{Result, StoreError};
use crate::index::OrderedIndex;
use crate::keyed_store::KeyedStore;
use crate::query::Query;
use crate::query_planner::plan_query;
use crate::{log_debug, log_info, log_warn};

/// Collection names become file name stems, so they are restricted to a safe alphabet
///
/// `.` is excluded: it separates the name from the suffixes of the
/// documents, catalog and index files (`<name>.json`, `<name>.indexes.json`,
/// `<name>.<field>.<hash>.idx`).
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::Validation(
            "collection name must not be empty".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
    {
        return Err(StoreError::Validation(format!(
            "illegal collection name '{}'",
            name
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub struct Collection {
    name: String,
    data_dir: PathBuf,
    store: KeyedStore<Document>,
    indexes: BTreeMap<String, OrderedIndex>,
}

impl Collection {
    /// Empty, unsaved collection
    pub fn new<P: AsRef<Path>>(name: &str, data_dir: P) -> Result<Self> {
        validate_collection_name(name)?;
        Ok(Collection {
            name: name.to_string(),
            data_dir: data_dir.as_ref().to_path_buf(),
            store: KeyedStore::new(),
            indexes: BTreeMap::new(),
        })
    }

    /// Load documents from `<data_dir>/<name>.json`, or start empty
    ///
    /// Indexes are not loaded; call `load_indexes` for that.
    pub fn load<P: AsRef<Path>>(name: &str, data_dir: P) -> Result<Self> {
        let mut collection = Collection::new(name, data_dir)?;
        collection.store = persistence::load_documents(&collection.path())?;
        log_info!(
            "loaded collection '{}' ({} documents)",
            collection.name,
            collection.store.len()
        );
        Ok(collection)
    }

    /// `load` followed by `load_indexes`
    pub fn open<P: AsRef<Path>>(name: &str, data_dir: P) -> Result<Self> {
        let mut collection = Collection::load(name, data_dir)?;
        collection.load_indexes()?;
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Location of the documents file
    pub fn path(&self) -> PathBuf {
        persistence::documents_path(&self.data_dir, &self.name)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // ========== DOCUMENTS ==========

    /// Store a document under a freshly generated id
    ///
    /// Any `_id` supplied by the caller is replaced.
    pub fn insert(&mut self, mut document: Document) -> DocumentId {
        let mut id = DocumentId::generate();
        while self.store.contains(id.as_str()) {
            log_warn!("generated id {} collides in '{}', regenerating", id, self.name);
            id = DocumentId::generate();
        }
        document.set_id(&id);

        for index in self.indexes.values_mut() {
            if let Some(key) = index.extract_key(&document) {
                index.insert(key, id.clone());
            }
        }
        self.store.put(id.clone(), document);
        id
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Document> {
        self.store.get(id)
    }

    /// Remove a document and every index entry pointing at it
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(document) = self.store.take(id) else {
            return false;
        };
        let doc_id = DocumentId::from(id);
        for index in self.indexes.values_mut() {
            if let Some(key) = index.extract_key(&document) {
                index.remove(&key, &doc_id);
            }
        }
        true
    }

    /// Snapshot of every document, ordered by id
    pub fn all(&self) -> Vec<Document> {
        let mut ids: Vec<&DocumentId> = self.store.items().map(|(id, _)| id).collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.store.get(id.as_str()).cloned())
            .collect()
    }

    // ========== QUERIES ==========

    /// Ids of matching documents
    ///
    /// Uses an index when the query is a single indexable clause (results
    /// in ascending key order), otherwise scans every document (results in
    /// id order).
    pub fn find_ids(&self, query: &Query) -> Vec<DocumentId> {
        if let Some(plan) = plan_query(query, |field| self.indexes.contains_key(field)) {
            if let Some(index) = self.indexes.get(&plan.field) {
                log_debug!("'{}': index path on '{}'", self.name, plan.field);
                return plan
                    .execute(index)
                    .into_iter()
                    .filter(|id| {
                        self.store
                            .get(id.as_str())
                            .map_or(false, |doc| query.matches(doc))
                    })
                    .collect();
            }
        }

        log_debug!("'{}': full scan over {} documents", self.name, self.store.len());
        let mut ids: Vec<DocumentId> = self
            .store
            .items()
            .filter(|(_, doc)| query.matches(doc))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn find(&self, query: &Query) -> Vec<Document> {
        self.find_ids(query)
            .iter()
            .filter_map(|id| self.store.get(id.as_str()).cloned())
            .collect()
    }

    /// Matching documents by a full scan, ignoring indexes
    pub fn scan(&self, query: &Query) -> Vec<Document> {
        self.all().into_iter().filter(|doc| query.matches(doc)).collect()
    }

    /// Delete every matching document; returns how many were removed
    pub fn delete_matching(&mut self, query: &Query) -> usize {
        let ids = self.find_ids(query);
        ids.iter().filter(|id| self.delete(id.as_str())).count()
    }

    // ========== INDEXES ==========

    /// Build an index on `field` from the current documents
    pub fn create_index(&mut self, field: &str, branching_factor: usize) -> Result<()> {
        if self.indexes.contains_key(field) {
            return Err(StoreError::IndexAlreadyExists {
                collection: self.name.clone(),
                field: field.to_string(),
            });
        }
        let index = OrderedIndex::build(field, branching_factor, self.store.items())?;
        log_info!(
            "created index '{}' on '{}' ({} entries, height {})",
            field,
            self.name,
            index.len(),
            index.height()
        );
        self.indexes.insert(field.to_string(), index);
        Ok(())
    }

    /// Remove the index on `field`, its file and its catalog entry
    pub fn drop_index(&mut self, field: &str) -> Result<()> {
        if self.indexes.remove(field).is_none() {
            return Err(self.index_missing(field));
        }
        let path = self.index_path(field);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.write_catalog()
    }

    /// Repopulate every index from the current documents
    pub fn rebuild_all_indexes(&mut self) -> Result<()> {
        for (field, index) in self.indexes.iter_mut() {
            *index = OrderedIndex::build(field.as_str(), index.branching_factor(), self.store.items())?;
        }
        log_debug!("rebuilt {} indexes of '{}'", self.indexes.len(), self.name);
        Ok(())
    }

    pub fn has_index(&self, field: &str) -> bool {
        self.indexes.contains_key(field)
    }

    pub fn index(&self, field: &str) -> Option<&OrderedIndex> {
        self.indexes.get(field)
    }

    /// Indexed field names, sorted
    pub fn list_indexes(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    fn index_missing(&self, field: &str) -> StoreError {
        StoreError::IndexMissing {
            collection: self.name.clone(),
            field: field.to_string(),
        }
    }

    fn index_path(&self, field: &str) -> PathBuf {
        self.data_dir
            .join(index_persistence::index_file_name(&self.name, field))
    }

    fn catalog_entries(&self) -> Vec<CatalogEntry> {
        self.indexes
            .values()
            .map(|index| CatalogEntry {
                field: index.field().to_string(),
                branching_factor: index.branching_factor(),
                file: index_persistence::index_file_name(&self.name, index.field()),
            })
            .collect()
    }

    fn write_catalog(&self) -> Result<()> {
        index_persistence::write_catalog(&self.data_dir, &self.name, self.catalog_entries())
    }

    // ========== PERSISTENCE ==========

    /// Rewrite the documents file
    pub fn save(&self) -> Result<()> {
        persistence::save_documents(&self.path(), &self.store)
    }

    /// Write one index file and refresh the catalog
    pub fn save_index(&self, field: &str) -> Result<()> {
        let index = self.indexes.get(field).ok_or_else(|| self.index_missing(field))?;
        index_persistence::write_index_file(&self.index_path(field), index)?;
        self.write_catalog()
    }

    /// Write every index file and the catalog
    pub fn save_indexes(&self) -> Result<()> {
        for (field, index) in &self.indexes {
            index_persistence::write_index_file(&self.index_path(field), index)?;
        }
        self.write_catalog()
    }

    /// Load the indexes listed in the catalog
    ///
    /// An index file that is missing or fails verification is rebuilt from
    /// the documents and rewritten.
    pub fn load_indexes(&mut self) -> Result<()> {
        let entries = index_persistence::read_catalog(&self.data_dir, &self.name)?;
        self.indexes.clear();

        for entry in entries {
            let path = self.data_dir.join(&entry.file);
            let loaded = index_persistence::read_index_file(&path).and_then(|index| {
                if index.field() == entry.field {
                    Ok(index)
                } else {
                    Err(StoreError::Corruption(format!(
                        "{} holds field '{}'",
                        entry.file,
                        index.field()
                    )))
                }
            });

            let index = match loaded {
                Ok(index) => {
                    log_debug!("loaded index '{}' of '{}'", entry.field, self.name);
                    index
                }
                Err(e) => {
                    log_warn!(
                        "index '{}' of '{}' unusable ({}), rebuilding from documents",
                        entry.field,
                        self.name,
                        e
                    );
                    let index = OrderedIndex::build(
                        entry.field.as_str(),
                        entry.branching_factor,
                        self.store.items(),
                    )?;
                    index_persistence::write_index_file(&path, &index)?;
                    index
                }
            };
            self.indexes.insert(entry.field, index);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKey;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn query(value: serde_json::Value) -> Query {
        Query::parse(&value).unwrap()
    }

    fn people(dir: &Path) -> Collection {
        let mut c = Collection::new("people", dir).unwrap();
        c.insert(doc(json!({"name": "Alice", "age": 25, "city": "London"})));
        c.insert(doc(json!({"name": "Bob", "age": 31, "city": "Paris"})));
        c.insert(doc(json!({"name": "Carol", "age": 19.0, "city": "London"})));
        c.insert(doc(json!({"name": "Dan", "age": "40"})));
        c
    }

    #[test]
    fn test_collection_names() {
        assert!(validate_collection_name("users_2024-v1").is_ok());
        for bad in ["", "..", ".hidden", "a/b", "a b", "../etc", "users.indexes", "users.json"] {
            assert!(validate_collection_name(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_insert_assigns_fresh_id() {
        let dir = TempDir::new().unwrap();
        let mut c = Collection::new("people", dir.path()).unwrap();
        let id = c.insert(doc(json!({"_id": "mine", "name": "Alice"})));
        assert_ne!(id.as_str(), "mine");
        let stored = c.get_by_id(id.as_str()).unwrap();
        assert_eq!(stored.id(), Some(id));
        assert!(c.get_by_id("mine").is_none());
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let mut c = people(dir.path());
        c.create_index("age", 3).unwrap();
        let bob = c.find_ids(&query(json!({"name": "Bob"})))[0].clone();

        assert!(c.delete(bob.as_str()));
        assert!(!c.delete(bob.as_str()));
        assert!(c.get_by_id(bob.as_str()).is_none());
        assert_eq!(c.len(), 3);
        assert!(c.index("age").unwrap().search(&IndexKey::number(31.0)).is_empty());
    }

    #[test]
    fn test_index_path_matches_full_scan() {
        let dir = TempDir::new().unwrap();
        let mut c = people(dir.path());
        c.create_index("age", 3).unwrap();
        c.create_index("city", 3).unwrap();

        for payload in [
            json!({"age": 25}),
            json!({"age": 25.0}),
            json!({"age": {"$gt": 20}}),
            json!({"age": {"$lt": 30}}),
            json!({"age": {"$in": [19, 31, "40"]}}),
            json!({"city": "London"}),
            json!({"city": {"$gt": 0}}),
        ] {
            let q = query(payload.clone());
            let mut indexed = c.find(&q);
            let mut scanned = c.scan(&q);
            indexed.sort_by_key(|d| d.id());
            scanned.sort_by_key(|d| d.id());
            assert_eq!(indexed, scanned, "{}", payload);
        }
        assert_eq!(c.find(&query(json!({"age": {"$gt": 20}}))).len(), 2);
    }

    #[test]
    fn test_index_results_in_key_order() {
        let dir = TempDir::new().unwrap();
        let mut c = people(dir.path());
        c.create_index("age", 4).unwrap();
        let names: Vec<_> = c
            .find(&query(json!({"age": {"$gt": 0}})))
            .iter()
            .map(|d| d.get("name").cloned().unwrap())
            .collect();
        assert_eq!(names, vec![json!("Carol"), json!("Alice"), json!("Bob")]);
    }

    #[test]
    fn test_create_index_twice_fails() {
        let dir = TempDir::new().unwrap();
        let mut c = people(dir.path());
        c.create_index("age", 8).unwrap();
        assert!(matches!(
            c.create_index("age", 8),
            Err(StoreError::IndexAlreadyExists { .. })
        ));
        assert!(matches!(
            c.create_index("name", 1),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(c.list_indexes(), vec!["age".to_string()]);
    }

    #[test]
    fn test_delete_matching_keeps_indexes_consistent() {
        let dir = TempDir::new().unwrap();
        let mut c = people(dir.path());
        c.create_index("city", 3).unwrap();
        assert_eq!(c.delete_matching(&query(json!({"city": "London"}))), 2);
        let incremental = c.index("city").unwrap().entries();
        c.rebuild_all_indexes().unwrap();
        assert_eq!(c.index("city").unwrap().entries(), incremental);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_save_load_with_indexes() {
        let dir = TempDir::new().unwrap();
        let mut c = people(dir.path());
        c.create_index("age", 3).unwrap();
        c.save().unwrap();
        c.save_indexes().unwrap();

        let plain = Collection::load("people", dir.path()).unwrap();
        assert_eq!(plain.len(), 4);
        assert!(plain.list_indexes().is_empty());

        let opened = Collection::open("people", dir.path()).unwrap();
        assert_eq!(opened.all(), c.all());
        assert_eq!(
            opened.index("age").unwrap().entries(),
            c.index("age").unwrap().entries()
        );
    }

    #[test]
    fn test_corrupt_index_file_rebuilt() {
        let dir = TempDir::new().unwrap();
        let mut c = people(dir.path());
        c.create_index("age", 3).unwrap();
        c.save().unwrap();
        c.save_indexes().unwrap();

        let path = c.index_path("age");
        fs::write(&path, b"garbage").unwrap();
        let opened = Collection::open("people", dir.path()).unwrap();
        assert_eq!(opened.index("age").unwrap().len(), 4);
        assert!(index_persistence::read_index_file(&path).is_ok());

        fs::remove_file(&path).unwrap();
        let opened = Collection::open("people", dir.path()).unwrap();
        assert_eq!(opened.index("age").unwrap().len(), 4);
    }

    #[test]
    fn test_drop_index() {
        let dir = TempDir::new().unwrap();
        let mut c = people(dir.path());
        c.create_index("age", 3).unwrap();
        c.save_index("age").unwrap();
        let path = c.index_path("age");
        assert!(path.exists());

        c.drop_index("age").unwrap();
        assert!(!path.exists());
        assert!(!c.has_index("age"));
        assert!(matches!(c.drop_index("age"), Err(StoreError::IndexMissing { .. })));
        assert!(Collection::open("people", dir.path()).unwrap().list_indexes().is_empty());
    }
}
