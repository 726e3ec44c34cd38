//! pulse-web: HTTP ingestion server for device telemetry.
//!
//! Devices POST readings to a single endpoint; the server validates them,
//! persists device / sensor / reading records into a document store, keeps
//! the most recent accepted submission in a process-wide snapshot slot, and
//! fans every accepted submission out to all connected WebSocket viewers.

pub mod api;
pub mod app;
pub mod config;
pub mod hub;
pub mod ingest;
pub mod persist;
pub mod snapshot;
pub mod store;
pub mod util;
pub mod validate;
