// Collection integration tests: persistence round trips and
// index/store consistency across save, load and rebuild

use docbase_core::{Collection, Document, DocumentId, IndexKey, Query};
use serde_json::{json, Value};
use std::collections::HashSet;
use tempfile::TempDir;

fn doc(value: Value) -> Document {
    Document::from_value(value).unwrap()
}

fn query(value: Value) -> Query {
    Query::parse(&value).unwrap()
}

fn seeded(dir: &TempDir, count: usize) -> (Collection, Vec<DocumentId>) {
    let mut collection = Collection::new("orders", dir.path()).unwrap();
    let ids = (0..count)
        .map(|i| {
            collection.insert(doc(json!({
                "seq": i,
                "total": (i % 17) as f64 * 2.5,
                "status": if i % 3 == 0 { "open" } else { "closed" },
                "priority": i % 2 == 0,
                "customer": {"name": format!("customer-{}", i % 5)},
                "tags": ["a", "b"],
            })))
        })
        .collect();
    (collection, ids)
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[test]
fn test_save_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let (collection, ids) = seeded(&dir, 120);
    collection.save().unwrap();

    let loaded = Collection::load("orders", dir.path()).unwrap();
    assert_eq!(loaded.len(), 120);
    for id in &ids {
        assert_eq!(loaded.get_by_id(id.as_str()), collection.get_by_id(id.as_str()));
    }
    assert_eq!(loaded.all(), collection.all());
}

#[test]
fn test_load_missing_collection_is_empty() {
    let dir = TempDir::new().unwrap();
    let collection = Collection::load("nothing_here", dir.path()).unwrap();
    assert!(collection.is_empty());
    assert!(collection.all().is_empty());
    assert!(!collection.path().exists());
}

#[test]
fn test_load_does_not_rebuild_indexes() {
    let dir = TempDir::new().unwrap();
    let (mut collection, _) = seeded(&dir, 40);
    collection.create_index("total", 8).unwrap();
    collection.save().unwrap();
    collection.save_indexes().unwrap();

    let mut loaded = Collection::load("orders", dir.path()).unwrap();
    assert!(!loaded.has_index("total"));

    loaded.load_indexes().unwrap();
    assert_eq!(loaded.list_indexes(), vec!["total".to_string()]);
    assert_eq!(
        loaded.index("total").unwrap().entries(),
        collection.index("total").unwrap().entries()
    );
    assert_eq!(loaded.index("total").unwrap().branching_factor(), 8);
}

#[test]
fn test_persisted_file_is_id_keyed_object() {
    let dir = TempDir::new().unwrap();
    let (collection, ids) = seeded(&dir, 3);
    collection.save().unwrap();

    let text = std::fs::read_to_string(dir.path().join("orders.json")).unwrap();
    let on_disk: Value = serde_json::from_str(&text).unwrap();
    let object = on_disk.as_object().unwrap();
    assert_eq!(object.len(), 3);
    for id in ids {
        assert_eq!(object[id.as_str()]["_id"], json!(id.as_str()));
    }
}

// =============================================================================
// DELETE CONSISTENCY
// =============================================================================

#[test]
fn test_delete_consistency_with_rebuild() {
    let dir = TempDir::new().unwrap();
    let (mut collection, ids) = seeded(&dir, 200);
    for field in ["total", "status", "priority", "customer.name", "seq"] {
        collection.create_index(field, 4).unwrap();
    }

    let doomed: Vec<&DocumentId> = ids.iter().step_by(3).collect();
    for id in &doomed {
        assert!(collection.delete(id.as_str()));
    }

    let snapshot: Vec<_> = collection
        .list_indexes()
        .into_iter()
        .map(|field| (field.clone(), collection.index(&field).unwrap().entries()))
        .collect();

    let remaining: HashSet<String> = collection
        .all()
        .iter()
        .filter_map(|d| d.id().map(DocumentId::into_string))
        .collect();
    for id in &doomed {
        assert!(collection.get_by_id(id.as_str()).is_none());
        assert!(!remaining.contains(id.as_str()));
    }

    collection.rebuild_all_indexes().unwrap();
    for (field, entries) in snapshot {
        assert_eq!(collection.index(&field).unwrap().entries(), entries, "{}", field);
        for (_, set) in entries {
            for id in set {
                assert!(!doomed.contains(&&id));
            }
        }
    }
}

#[test]
fn test_delete_matching_uses_index_and_scan_alike() {
    let dir = TempDir::new().unwrap();
    let (mut indexed, _) = seeded(&dir, 90);
    indexed.create_index("status", 5).unwrap();

    let open_before = indexed.find(&query(json!({"status": "open"}))).len();
    assert_eq!(open_before, 30);
    assert_eq!(indexed.delete_matching(&query(json!({"status": "open"}))), 30);
    assert!(indexed.find(&query(json!({"status": "open"}))).is_empty());
    assert!(indexed
        .index("status")
        .unwrap()
        .search(&IndexKey::String("open".into()))
        .is_empty());
    assert_eq!(indexed.len(), 60);
}

// =============================================================================
// QUERIES
// =============================================================================

#[test]
fn test_dotted_field_index() {
    let dir = TempDir::new().unwrap();
    let (mut collection, _) = seeded(&dir, 50);
    collection.create_index("customer.name", 3).unwrap();

    let q = query(json!({"customer.name": "customer-3"}));
    assert_eq!(collection.find(&q).len(), 10);
    assert_eq!(collection.find(&q), collection.scan(&q));
}

#[test]
fn test_bool_index_and_like_scan() {
    let dir = TempDir::new().unwrap();
    let (mut collection, _) = seeded(&dir, 50);
    collection.create_index("priority", 3).unwrap();

    assert_eq!(collection.find(&query(json!({"priority": true}))).len(), 25);
    assert_eq!(
        collection.find(&query(json!({"status": {"$like": "c%d"}}))).len(),
        33
    );
    assert_eq!(
        collection
            .find(&query(json!({"$or": [{"seq": 1}, {"seq": 2}, {"seq": 999}]})))
            .len(),
        2
    );
}
