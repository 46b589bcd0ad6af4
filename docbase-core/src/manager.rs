// src/manager.rs
//! Collection manager: registry of resident collections and the single
//! serialized write pipeline
//!
//! ```text
//! submitter ──WriteJob──▶ [bounded queue] ──▶ writer thread ──▶ Collection (write lock)
//!     ▲                                            │              mutate + persist
//!     └────────────── reply channel ◀──────────────┘
//! ```
//!
//! Writes from every thread and for every collection run one at a time, in
//! queue order. Reads take the collection's read lock directly, so they see
//! the state either before or after a write, never a mix.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::collection::{validate_collection_name, Collection};
use crate::command::{Request, Response};
use crate::config::StoreConfig;
use crate::document::{Document, DocumentId};
use crate::error::{Result, StoreError};
use crate::logging::set_log_level;
use crate::query::Query;
use crate::{log_debug, log_error, log_info, log_warn};

/// A resident collection guarded by its own lock
pub type SharedCollection = Arc<RwLock<Collection>>;

type WriteOperation = Box<dyn FnOnce(&mut Collection) -> Result<WriteResult> + Send>;

/// Outcome of one mutating operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    pub inserted_ids: Vec<DocumentId>,
    pub deleted_count: usize,
    pub message: String,
}

/// One unit of serialized write work
pub struct WriteJob {
    collection: String,
    operation: WriteOperation,
    reply: Sender<Result<WriteResult>>,
}

/// Name -> collection map, loading collections on first reference
struct Registry {
    config: StoreConfig,
    collections: Mutex<HashMap<String, SharedCollection>>,
}

impl Registry {
    fn get_or_load(&self, name: &str) -> Result<SharedCollection> {
        validate_collection_name(name)?;
        let mut collections = self.collections.lock();
        if let Some(existing) = collections.get(name) {
            return Ok(Arc::clone(existing));
        }

        let collection = Collection::open(name, &self.config.data_dir)?;
        let shared = Arc::new(RwLock::new(collection));
        collections.insert(name.to_string(), Arc::clone(&shared));
        Ok(shared)
    }

    fn execute(&self, job: WriteJob) {
        let WriteJob {
            collection,
            operation,
            reply,
        } = job;

        let result = self.get_or_load(&collection).and_then(|shared| {
            // Held across mutation and persistence
            let mut guard = shared.write();
            log_debug!("executing write job on '{}'", collection);

            let outcome = operation(&mut guard);
            if let Err(e) = &outcome {
                if e.is_persistence() {
                    log_error!("persisting '{}' failed: {}", collection, e);
                    if let Err(rebuild) = guard.rebuild_all_indexes() {
                        log_error!("rebuilding indexes of '{}' failed: {}", collection, rebuild);
                    }
                }
            }
            outcome
        });

        // Submitter may have gone away; nothing to do then
        let _ = reply.send(result);
    }
}

fn run_worker(registry: Arc<Registry>, jobs: Receiver<WriteJob>, stop: Receiver<()>) {
    log_info!("write worker started");
    loop {
        channel::select! {
            recv(jobs) -> job => match job {
                Ok(job) => registry.execute(job),
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }

    let mut discarded = 0;
    while let Ok(job) = jobs.try_recv() {
        let _ = job.reply.send(Err(StoreError::ManagerStopped));
        discarded += 1;
    }
    if discarded > 0 {
        log_warn!("discarded {} queued write job(s) on shutdown", discarded);
    }
    log_info!("write worker stopped");
}

/// Process-wide entry point: owns the registry and the write worker
///
/// Create once, share by reference (or `Arc`), and call `stop` (or drop it)
/// to shut the worker down.
pub struct CollectionManager {
    registry: Arc<Registry>,
    jobs: Mutex<Option<Sender<WriteJob>>>,
    stop_signal: Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CollectionManager {
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        set_log_level(config.log_level);
        fs::create_dir_all(&config.data_dir)?;

        let (job_tx, job_rx) = channel::bounded(config.queue_capacity);
        let (stop_tx, stop_rx) = channel::bounded(1);
        let registry = Arc::new(Registry {
            config,
            collections: Mutex::new(HashMap::new()),
        });

        let worker_registry = Arc::clone(&registry);
        let handle = thread::Builder::new()
            .name("docbase-writer".to_string())
            .spawn(move || run_worker(worker_registry, job_rx, stop_rx))?;

        Ok(CollectionManager {
            registry,
            jobs: Mutex::new(Some(job_tx)),
            stop_signal: stop_tx,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.registry.config
    }

    pub fn is_running(&self) -> bool {
        self.jobs.lock().is_some()
    }

    /// Queue a write and block until the worker has applied and persisted it
    fn submit<F>(&self, collection: &str, operation: F) -> Result<WriteResult>
    where
        F: FnOnce(&mut Collection) -> Result<WriteResult> + Send + 'static,
    {
        validate_collection_name(collection)?;
        let sender = self.jobs.lock().clone().ok_or(StoreError::ManagerStopped)?;

        let (reply_tx, reply_rx) = channel::bounded(1);
        let job = WriteJob {
            collection: collection.to_string(),
            operation: Box::new(operation),
            reply: reply_tx,
        };
        // Blocks while the queue is full
        sender.send(job).map_err(|_| StoreError::ManagerStopped)?;
        drop(sender);

        reply_rx.recv().map_err(|_| StoreError::ManagerStopped)?
    }

    // ========== WRITES ==========

    pub fn insert(&self, collection: &str, documents: Vec<Document>) -> Result<WriteResult> {
        self.submit(collection, move |c| {
            let inserted_ids: Vec<DocumentId> =
                documents.into_iter().map(|doc| c.insert(doc)).collect();
            c.save()?;
            c.save_indexes()?;
            Ok(WriteResult {
                message: format!("inserted {} document(s)", inserted_ids.len()),
                inserted_ids,
                deleted_count: 0,
            })
        })
    }

    pub fn delete(&self, collection: &str, query: Query) -> Result<WriteResult> {
        self.submit(collection, move |c| {
            let deleted_count = c.delete_matching(&query);
            if deleted_count > 0 {
                c.save()?;
                c.save_indexes()?;
            }
            Ok(WriteResult {
                message: format!("deleted {} document(s)", deleted_count),
                inserted_ids: Vec::new(),
                deleted_count,
            })
        })
    }

    pub fn create_index(
        &self,
        collection: &str,
        field: &str,
        branching_factor: usize,
    ) -> Result<WriteResult> {
        if field.is_empty() {
            return Err(StoreError::Validation(
                "create_index requires a field name".to_string(),
            ));
        }
        let field = field.to_string();
        self.submit(collection, move |c| {
            c.create_index(&field, branching_factor)?;
            c.save_index(&field)?;
            Ok(WriteResult {
                message: format!("index created on field '{}'", field),
                ..WriteResult::default()
            })
        })
    }

    // ========== READS ==========

    pub fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let shared = self.registry.get_or_load(collection)?;
        let guard = shared.read();
        Ok(guard.find(query))
    }

    pub fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let shared = self.registry.get_or_load(collection)?;
        let guard = shared.read();
        Ok(guard.get_by_id(id).cloned())
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        let shared = self.registry.get_or_load(collection)?;
        let guard = shared.read();
        Ok(guard.len())
    }

    /// Run `f` against a collection under its read lock
    ///
    /// `f` must not submit writes (`insert`, `delete`, `create_index`) to the
    /// same collection: the writer thread blocks on the write lock this call
    /// holds while `f` blocks on the writer's reply, and neither returns.
    /// Reads, and writes to other collections, are fine.
    pub fn with_collection<R, F>(&self, collection: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Collection) -> R,
    {
        let shared = self.registry.get_or_load(collection)?;
        let guard = shared.read();
        Ok(f(&guard))
    }

    /// Names of the collections resident in memory, sorted
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.collections.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Decode-free request entry point used by the CLI and network front ends
    pub fn execute(&self, request: Request) -> Response {
        crate::command::execute(self, request)
    }

    // ========== LIFECYCLE ==========

    /// Stop accepting writes, discard queued jobs and join the worker
    ///
    /// Idempotent. Writes submitted afterwards fail with `ManagerStopped`;
    /// reads keep working against the resident collections.
    pub fn stop(&self) {
        let Some(sender) = self.jobs.lock().take() else {
            return;
        };
        drop(sender);
        let _ = self.stop_signal.send(());

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                log_error!("write worker panicked");
            }
        }
    }
}

impl Drop for CollectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
