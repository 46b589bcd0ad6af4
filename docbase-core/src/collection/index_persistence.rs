// Index persistence
//
// `<collection>.indexes.json` lists the indexes of a collection. Each index
// lives in its own file:
//
//   [magic: 8 bytes][crc32 of payload: u32 LE][payload: bincode IndexSnapshot]
//
// The payload holds the sorted entries, so loading bulk-builds the tree
// without touching the documents.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::persistence::write_atomic;
use crate::error::{Result, StoreError};
use crate::index::{DocIdSet, IndexKey, OrderedIndex};

const INDEX_MAGIC: &[u8; 8] = b"DOCBIDX1";
const HEADER_LEN: usize = INDEX_MAGIC.len() + 4;

/// One catalog line: which file holds the index on `field`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub field: String,
    pub branching_factor: usize,
    pub file: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexCatalog {
    indexes: Vec<CatalogEntry>,
}

#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    field: String,
    branching_factor: usize,
    entries: Vec<(IndexKey, DocIdSet)>,
}

fn sanitize_component(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "index".to_string()
    } else {
        sanitized
    }
}

/// `<collection>.<sanitised field>.<crc32 of field>.idx`
///
/// The hash keeps fields that sanitise identically (`a.b` and `a_b`) apart.
pub(crate) fn index_file_name(collection: &str, field: &str) -> String {
    format!(
        "{}.{}.{:08x}.idx",
        collection,
        sanitize_component(field),
        crc32fast::hash(field.as_bytes())
    )
}

pub(crate) fn catalog_path(data_dir: &Path, collection: &str) -> PathBuf {
    data_dir.join(format!("{}.indexes.json", collection))
}

/// Catalog entries; a missing catalog means no indexes
pub(crate) fn read_catalog(data_dir: &Path, collection: &str) -> Result<Vec<CatalogEntry>> {
    match fs::read(catalog_path(data_dir, collection)) {
        Ok(bytes) => {
            let catalog: IndexCatalog = serde_json::from_slice(&bytes)?;
            Ok(catalog.indexes)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn write_catalog(data_dir: &Path, collection: &str, entries: Vec<CatalogEntry>) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(&IndexCatalog { indexes: entries })?;
    write_atomic(&catalog_path(data_dir, collection), &bytes)
}

pub(crate) fn encode_index(index: &OrderedIndex) -> Result<Vec<u8>> {
    let snapshot = IndexSnapshot {
        field: index.field().to_string(),
        branching_factor: index.branching_factor(),
        entries: index.entries(),
    };
    let payload = bincode::serialize(&snapshot)?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(INDEX_MAGIC);
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Verify header and checksum, then bulk-load the tree
pub(crate) fn decode_index(bytes: &[u8]) -> Result<OrderedIndex> {
    if bytes.len() < HEADER_LEN || &bytes[..INDEX_MAGIC.len()] != INDEX_MAGIC {
        return Err(StoreError::Corruption("index file header mismatch".to_string()));
    }
    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&bytes[INDEX_MAGIC.len()..HEADER_LEN]);
    let payload = &bytes[HEADER_LEN..];
    if crc32fast::hash(payload) != u32::from_le_bytes(checksum) {
        return Err(StoreError::Corruption("index file checksum mismatch".to_string()));
    }

    let snapshot: IndexSnapshot = bincode::deserialize(payload)
        .map_err(|e| StoreError::Corruption(format!("index payload: {}", e)))?;
    OrderedIndex::from_sorted_entries(snapshot.field, snapshot.branching_factor, snapshot.entries)
}

pub(crate) fn write_index_file(path: &Path, index: &OrderedIndex) -> Result<()> {
    write_atomic(path, &encode_index(index)?)
}

pub(crate) fn read_index_file(path: &Path) -> Result<OrderedIndex> {
    decode_index(&fs::read(path)?)
}
