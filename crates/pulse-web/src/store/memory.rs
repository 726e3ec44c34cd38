//! In-memory document store. Backs tests and the `memory` dev backend;
//! nothing survives a restart.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::store::bootstrap::{Candidate, StoreConnector};
use crate::store::{DocumentStore, StoreError};

#[derive(Debug, Default)]
struct Collection {
    keyed: HashMap<String, Value>,
    log: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Collection>>,
    // Collections forced to fail writes, for exercising error paths.
    failing: Mutex<HashSet<String>>,
}

impl MemoryStore {
    /// Make every write to `collection` fail until cleared. Test hook.
    pub fn fail_writes_to(&self, collection: &str) {
        self.failing.lock().insert(collection.into());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    fn check_writable(&self, collection: &str) -> Result<(), StoreError> {
        if self.failing.lock().contains(collection) {
            return Err(StoreError::Write {
                collection: collection.into(),
                reason: String::from("write failure injected"),
            });
        }
        Ok(())
    }

    /// The document stored under `id`, if any.
    pub fn get(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .lock()
            .get(collection)
            .and_then(|c| c.keyed.get(id).cloned())
    }

    /// All appended (identity-less) documents, in insertion order.
    pub fn log_rows(&self, collection: &str) -> Vec<Value> {
        self.collections
            .lock()
            .get(collection)
            .map(|c| c.log.clone())
            .unwrap_or_default()
    }

    /// Number of keyed documents in `collection`.
    pub fn keyed_len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map(|c| c.keyed.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        self.check_writable(collection)?;
        self.collections
            .lock()
            .entry(collection.into())
            .or_default()
            .keyed
            .insert(id.into(), doc);
        Ok(())
    }

    async fn insert(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        self.check_writable(collection)?;
        self.collections
            .lock()
            .entry(collection.into())
            .or_default()
            .log
            .push(doc);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Connector for the in-memory backend. Always hands out the same shared
/// store, so candidate probing trivially succeeds on the configured values.
#[derive(Default, Clone)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, _: &Candidate) -> Result<Arc<dyn DocumentStore>, StoreError> {
        Ok(self.store.clone())
    }
}
