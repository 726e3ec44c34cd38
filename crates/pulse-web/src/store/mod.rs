//! Abstract document store: named collections, upsert-by-id, append-only
//! insert. Backends plug in behind [`DocumentStore`]; the connection
//! bootstrapper in [`bootstrap`] owns the single shared handle.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod bootstrap;
pub mod memory;
pub mod remote;
pub mod sqlite;

pub use bootstrap::{Bootstrap, Candidate, StoreConnector};
pub use memory::{MemoryConnector, MemoryStore};
pub use remote::RemoteConnector;
pub use sqlite::{SqliteConnector, SqliteStore};

/// Devices, keyed by the caller-supplied device id.
pub const DEVICES: &str = "devices";
/// Sensors, keyed by the composite `{deviceId}-{name}` id.
pub const SENSORS: &str = "sensors";
/// Readings, append-only, no identity.
pub const SENSOR_DATA: &str = "sensorData";
/// Raw audit log of every accepted submission, append-only.
pub const REQUEST_DATA: &str = "requestData";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The probe loop ran out of candidates. The summary carries one line
    /// per failed attempt.
    #[error("no storage candidate accepted a connection:\n{summary}")]
    AllCandidatesFailed { summary: String },

    /// A backend that was reachable at connect time stopped cooperating.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// A specific write failed after a connection existed.
    #[error("write to collection {collection:?} failed: {reason}")]
    Write { collection: String, reason: String },

    /// A record failed its shape check before any write was attempted.
    #[error("invalid {kind} record: {reason}")]
    InvalidRecord {
        kind: &'static str,
        reason: &'static str,
    },
}

/// The storage operations the ingestion pipeline needs. Object-safe so the
/// shared handle can be an `Arc<dyn DocumentStore>` regardless of backend.
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Insert-or-replace the document stored under `id` in `collection`.
    /// Last write wins; applying the same upsert twice yields the same
    /// stored state.
    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Append `doc` to `collection` without any identity check.
    async fn insert(&self, collection: &str, doc: Value) -> Result<(), StoreError>;

    /// Cheap liveness check against the backend.
    async fn ping(&self) -> Result<(), StoreError>;
}
