//! Shared server state and router assembly. All single-instance resources
//! (the storage bootstrapper, the snapshot slot, the viewer hub) live here
//! and are handed to every handler by cloning the state.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;

use crate::api::data::{data_get, data_post};
use crate::api::dbcheck::dbcheck;
use crate::hub::Hub;
use crate::snapshot::SnapshotSlot;
use crate::store::Bootstrap;

pub mod ids;
pub use ids::ViewerId;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Bootstrap>,
    pub snapshot: Arc<SnapshotSlot>,
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(bootstrap: Bootstrap) -> Self {
        let snapshot = Arc::new(SnapshotSlot::default());
        Self {
            store: Arc::new(bootstrap),
            hub: Arc::new(Hub::new(snapshot.clone())),
            snapshot,
        }
    }
}

/// One ingestion path dispatched by method and upgrade header; methods
/// outside GET/POST get the router's automatic 405.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/data", get(data_get).post(data_post))
        .route("/api/dbcheck", get(dbcheck))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn health() -> &'static str {
    "ok"
}
