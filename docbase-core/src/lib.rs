// docbase-core/src/lib.rs
// Embedded document store: collections, query engine, B+ tree indexes,
// serialized write pipeline

pub mod collection;
pub mod command;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod keyed_store;
pub mod logging;
pub mod manager;
pub mod query;
pub mod query_planner;
pub mod value_utils;

// Public exports
pub use collection::Collection;
pub use command::{Command, Request, Response, Status};
pub use config::StoreConfig;
pub use document::{Document, DocumentId};
pub use error::{Result, StoreError};
pub use index::{IndexKey, OrderedIndex};
pub use keyed_store::KeyedStore;
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use manager::{CollectionManager, WriteResult};
pub use query::{Condition, Query};
