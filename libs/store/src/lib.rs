//! # Registry Record Store
//!
//! The [`Store`] trait is the only persistence surface the service sees.
//! Implementations own name validation and uniqueness, and are safe to call
//! from many connection tasks at once; callers never lock around them.
//!
//! - [`SqliteStore`]: file-backed (or in-memory) SQLite, blocking calls
//!   moved off the async runtime
//! - [`MemoryStore`]: lock-protected vectors, counts calls for tests

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod validation;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use error::{StoreError, StoreResult, ValidationError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use validation::{validate_name, NAME_MAX_LEN, NAME_MIN_LEN};

/// A persisted record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// All records in insertion order
    async fn list(&self) -> StoreResult<Vec<StoredRecord>>;

    /// Validate and insert `name`, assigning a fresh id
    async fn create(&self, name: &str) -> StoreResult<StoredRecord>;

    async fn get_by_name(&self, name: &str) -> StoreResult<Option<StoredRecord>>;

    /// Cheap liveness check
    async fn ping(&self) -> StoreResult<()>;

    /// Release the backend; later calls fail with `Unavailable`
    async fn close(&self) -> StoreResult<()>;
}

/// Open the production store: SQLite at `path`, or in memory when absent
pub fn open_store(path: Option<&Path>) -> StoreResult<Arc<dyn Store>> {
    let store = match path {
        Some(path) => SqliteStore::open(path)?,
        None => SqliteStore::open_in_memory()?,
    };
    Ok(Arc::new(store))
}

fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
