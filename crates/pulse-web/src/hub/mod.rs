//! Broadcast hub: the set of currently connected viewers and the fan-out
//! of accepted submissions to all of them.
//!
//! Each viewer owns an mpsc channel; its WebSocket task drains the receiver
//! while the hub holds the sender. Broadcasting serializes the event once
//! and `try_send`s to every viewer registered at call time, so one slow or
//! broken viewer can only lose its own delivery, never block the others.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use pulse_types::SubmissionEnvelope;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::app::ids::ViewerId;
use crate::snapshot::SnapshotSlot;

pub mod session;

/// Outbound frames queued per viewer before deliveries start failing.
const VIEWER_QUEUE_DEPTH: usize = 32;

struct HubState {
    next_viewer_id: ViewerId,
    viewers: HashMap<ViewerId, mpsc::Sender<String>>,
}

pub struct Hub {
    snapshot: Arc<SnapshotSlot>,
    inner: Mutex<HubState>,
}

impl Hub {
    pub fn new(snapshot: Arc<SnapshotSlot>) -> Self {
        Self {
            snapshot,
            inner: Mutex::new(HubState {
                next_viewer_id: ViewerId::FIRST,
                viewers: HashMap::new(),
            }),
        }
    }

    /// Add a viewer. The current snapshot (if any) is queued first, before
    /// the viewer joins the broadcast set, so it arrives exactly once and
    /// ahead of any later broadcast event.
    pub fn register(&self) -> (ViewerId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(VIEWER_QUEUE_DEPTH);
        if let Some(snapshot) = self.snapshot.get() {
            match serde_json::to_string(snapshot.as_ref()) {
                // A fresh channel always has room for the first frame.
                Ok(json) => {
                    let _ = tx.try_send(json);
                }
                Err(e) => warn!(%e, "failed to serialize snapshot for new viewer"),
            }
        }
        let mut guard = self.inner.lock();
        let viewer_id = guard.next_viewer_id;
        guard.next_viewer_id = viewer_id.next();
        guard.viewers.insert(viewer_id, tx);
        info!(%viewer_id, viewers = guard.viewers.len(), "viewer registered");
        (viewer_id, rx)
    }

    /// Remove a viewer. Idempotent; unknown ids are ignored.
    pub fn unregister(&self, viewer_id: ViewerId) {
        let mut guard = self.inner.lock();
        if guard.viewers.remove(&viewer_id).is_some() {
            info!(%viewer_id, viewers = guard.viewers.len(), "viewer removed");
        }
    }

    /// Deliver `event` to every viewer registered right now. Serialized
    /// once; a failed delivery drops that viewer and the loop carries on.
    pub fn broadcast(&self, event: &SubmissionEnvelope) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!(%e, "failed to serialize broadcast event");
                return;
            }
        };
        let targets: Vec<(ViewerId, mpsc::Sender<String>)> = {
            let guard = self.inner.lock();
            guard
                .viewers
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };
        for (viewer_id, tx) in targets {
            if let Err(e) = tx.try_send(json.clone()) {
                warn!(%viewer_id, %e, "dropping viewer after failed delivery");
                self.unregister(viewer_id);
            }
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.lock().viewers.len()
    }
}
