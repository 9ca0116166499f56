//! Persistence for quota counters and download history
//!
//! - [`sqlite`] - SQLite database shared with other processes
//! - [`memory`] - In-process store for tests and ephemeral runs

pub mod memory;
pub mod sqlite;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::storage::DEFAULT_DATABASE_PATH;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}
