//! Embedded document store on sqlite. The standalone default: collections
//! become rows in two tables, upserts hit `keyed_documents` (primary key =
//! collection + doc id), appends hit `document_log`. Connections are opened
//! per operation and all rusqlite work runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Connection, params};
use serde_json::Value;
use tracing::info;

use crate::store::bootstrap::{Candidate, StoreConnector};
use crate::store::{DocumentStore, StoreError};
use crate::util::time::now_ms;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS keyed_documents (
    collection TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    body TEXT NOT NULL,
    saved_at_ms INTEGER NOT NULL,
    PRIMARY KEY (collection, doc_id)
);
CREATE TABLE IF NOT EXISTS document_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    body TEXT NOT NULL,
    saved_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS document_log_collection ON document_log (collection);
";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection, StoreError> {
        Connection::open(&self.path)
            .map_err(|e| StoreError::Unavailable(format!("open sqlite at {:?}: {e}", self.path)))
    }

    pub fn init(&self) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Unavailable(format!("init sqlite schema: {e}")))
    }

    fn upsert_blocking(&self, collection: &str, id: &str, body: &str) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO keyed_documents (collection, doc_id, body, saved_at_ms)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (collection, doc_id)
             DO UPDATE SET body = excluded.body, saved_at_ms = excluded.saved_at_ms",
            params![collection, id, body, now_ms()],
        )
        .map_err(|e| StoreError::Write {
            collection: collection.into(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn insert_blocking(&self, collection: &str, body: &str) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO document_log (collection, body, saved_at_ms) VALUES (?1, ?2, ?3)",
            params![collection, body, now_ms()],
        )
        .map_err(|e| StoreError::Write {
            collection: collection.into(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// The keyed document stored under `id`, if any. Blocking; test and
    /// tooling helper.
    pub fn fetch_blocking(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let conn = self.open()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM keyed_documents WHERE collection = ?1 AND doc_id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Unavailable(format!("fetch document: {other}"))),
            })?;
        match body {
            Some(body) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| StoreError::Unavailable(format!("stored document is not JSON: {e}"))),
            None => Ok(None),
        }
    }

    /// All appended documents for `collection`, oldest first. Blocking.
    pub fn log_rows_blocking(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare("SELECT body FROM document_log WHERE collection = ?1 ORDER BY seq")
            .map_err(|e| StoreError::Unavailable(format!("prepare log query: {e}")))?;
        let rows = stmt
            .query_map(params![collection], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::Unavailable(format!("query log: {e}")))?;
        let mut docs = Vec::new();
        for row in rows {
            let body = row.map_err(|e| StoreError::Unavailable(format!("read log row: {e}")))?;
            let doc = serde_json::from_str(&body)
                .map_err(|e| StoreError::Unavailable(format!("stored document is not JSON: {e}")))?;
            docs.push(doc);
        }
        Ok(docs)
    }
}

fn encode(collection: &str, doc: &Value) -> Result<String, StoreError> {
    serde_json::to_string(doc).map_err(|e| StoreError::Write {
        collection: collection.into(),
        reason: format!("encode document: {e}"),
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        let store = self.clone();
        let collection = collection.to_owned();
        let id = id.to_owned();
        let body = encode(&collection, &doc)?;
        tokio::task::spawn_blocking(move || store.upsert_blocking(&collection, &id, &body))
            .await
            .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))?
    }

    async fn insert(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        let store = self.clone();
        let collection = collection.to_owned();
        let body = encode(&collection, &doc)?;
        tokio::task::spawn_blocking(move || store.insert_blocking(&collection, &body))
            .await
            .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))?
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = store.open()?;
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| StoreError::Unavailable(format!("sqlite ping: {e}")))
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))?
    }
}

/// Connector for the embedded backend. The file path comes from local
/// configuration; candidate credentials do not apply to an embedded store,
/// so the configured candidate succeeds immediately.
pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl StoreConnector for SqliteConnector {
    async fn connect(&self, _: &Candidate) -> Result<Arc<dyn DocumentStore>, StoreError> {
        let store = SqliteStore::new(self.path.clone());
        let init = store.clone();
        tokio::task::spawn_blocking(move || init.init())
            .await
            .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))??;
        info!(path = ?store.path(), "sqlite document store ready");
        Ok(Arc::new(store))
    }
}
