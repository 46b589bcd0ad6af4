//! Store configuration
//!
//! Defaults match the behaviour of the command-line tool: documents live in
//! `./data`, the write queue holds 100 jobs and new indexes fan out 64 ways.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::index::MIN_BRANCHING_FACTOR;
use crate::logging::LogLevel;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_BRANCHING_FACTOR: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `<collection>.json` files and index files
    pub data_dir: PathBuf,
    /// Maximum number of queued write jobs before submitters block
    pub queue_capacity: usize,
    /// Fan-out of indexes created through the command layer
    pub default_branching_factor: usize,
    pub log_level: LogLevel,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            default_branching_factor: DEFAULT_BRANCHING_FACTOR,
            log_level: LogLevel::default(),
        }
    }
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        StoreConfig::default().with_data_dir(data_dir)
    }

    /// Defaults overlaid with `DOCBASE_*` environment variables.
    ///
    /// Unparseable values are rejected rather than ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = StoreConfig::default();

        if let Some(dir) = lookup("DOCBASE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("DOCBASE_QUEUE_CAPACITY") {
            config.queue_capacity = parse_usize("DOCBASE_QUEUE_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("DOCBASE_BRANCHING_FACTOR") {
            config.default_branching_factor = parse_usize("DOCBASE_BRANCHING_FACTOR", &raw)?;
        }
        if let Some(raw) = lookup("DOCBASE_LOG") {
            config.log_level = LogLevel::parse(&raw).ok_or_else(|| {
                StoreError::Validation(format!("DOCBASE_LOG: unknown log level '{}'", raw))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_data_dir<P: AsRef<Path>>(mut self, data_dir: P) -> Self {
        self.data_dir = data_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_branching_factor(mut self, branching_factor: usize) -> Self {
        self.default_branching_factor = branching_factor;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(StoreError::Validation(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.default_branching_factor < MIN_BRANCHING_FACTOR {
            return Err(StoreError::Validation(format!(
                "default_branching_factor must be at least {}",
                MIN_BRANCHING_FACTOR
            )));
        }
        Ok(())
    }
}

fn parse_usize(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| StoreError::Validation(format!("{}: {}", key, e)))
}
