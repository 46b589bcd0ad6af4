// Document file persistence: `<data_dir>/<collection>.json`, an object
// mapping id -> document, rewritten whole on every save.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::document::{Document, DocumentId};
use crate::error::{Result, StoreError};
use crate::keyed_store::KeyedStore;

pub(crate) fn documents_path(data_dir: &Path, collection: &str) -> PathBuf {
    data_dir.join(format!("{}.json", collection))
}

/// Two-phase write: data goes to `<path>.tmp`, is synced, then renamed over `path`
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let written = (|| -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = written.and_then(|_| fs::rename(&temp_path, path).map_err(StoreError::from)) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

/// Serialize every document, keys sorted for deterministic output
pub(crate) fn save_documents(path: &Path, store: &KeyedStore<Document>) -> Result<()> {
    let ordered: BTreeMap<&DocumentId, &Document> = store.items().collect();
    let bytes = serde_json::to_vec_pretty(&ordered)?;
    write_atomic(path, &bytes)
}

/// Read a documents file; a missing or empty file is an empty collection
pub(crate) fn load_documents(path: &Path) -> Result<KeyedStore<Document>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(KeyedStore::new()),
        Err(e) => return Err(e.into()),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(KeyedStore::new());
    }

    let raw: BTreeMap<DocumentId, Document> = serde_json::from_slice(&bytes)?;
    let mut store = KeyedStore::with_capacity(raw.len());
    for (id, mut document) in raw {
        if document.id().as_ref() != Some(&id) {
            document.set_id(&id);
        }
        store.put(id, document);
    }
    Ok(store)
}
