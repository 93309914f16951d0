//! In-memory store
//!
//! Same observable behavior as the SQLite store. Also counts every trait
//! call, which lets tests assert that a code path never reached storage.

use crate::{new_record_id, validate_name, Store, StoreError, StoreResult, StoredRecord};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

#[derive(Default)]
struct Records {
    ordered: Vec<StoredRecord>,
    by_name: HashMap<String, usize>,
}

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
    calls: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `Store` calls made so far, `close` included
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enter(&self, operation: &'static str) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::closed(operation));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list(&self) -> StoreResult<Vec<StoredRecord>> {
        self.enter("list")?;
        Ok(self.records.read().ordered.clone())
    }

    async fn create(&self, name: &str) -> StoreResult<StoredRecord> {
        self.enter("create")?;
        validate_name(name)?;

        let mut records = self.records.write();
        if records.by_name.contains_key(name) {
            return Err(StoreError::Duplicate {
                name: name.to_string(),
            });
        }
        let record = StoredRecord {
            id: new_record_id(),
            name: name.to_string(),
        };
        let index = records.ordered.len();
        records.ordered.push(record.clone());
        records.by_name.insert(record.name.clone(), index);
        debug!(name, id = %record.id, "Record created");
        Ok(record)
    }

    async fn get_by_name(&self, name: &str) -> StoreResult<Option<StoredRecord>> {
        self.enter("get_by_name")?;
        let records = self.records.read();
        Ok(records
            .by_name
            .get(name)
            .map(|&index| records.ordered[index].clone()))
    }

    async fn ping(&self) -> StoreResult<()> {
        self.enter("ping")
    }

    async fn close(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_read() {
        let store = MemoryStore::new();
        let created = store.create("testOrg").await.unwrap();
        let found = store.get_by_name("testOrg").await.unwrap().unwrap();
        assert_eq!(created, found);
        assert!(store.get_by_name("other").await.unwrap().is_none());
        assert_eq!(store.call_count(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_keeps_one_row() {
        let store = MemoryStore::new();
        store.create("testOrg").await.unwrap();
        let err = store.create("testOrg").await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let store = MemoryStore::new();
        store.close().await.unwrap();
        assert!(matches!(
            store.ping().await,
            Err(StoreError::Unavailable { .. })
        ));
        assert!(!store.create("testOrg").await.unwrap_err().is_rejection());
    }
}
