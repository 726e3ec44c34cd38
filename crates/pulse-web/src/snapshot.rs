//! Single-slot cache of the most recently accepted submission. New viewers
//! and the polling GET endpoint bootstrap from here; nothing is persisted
//! across restarts.

use std::sync::Arc;

use parking_lot::RwLock;
use pulse_types::SubmissionEnvelope;
use tracing::warn;

/// Last-writer-wins slot. Readers take a cheap `Arc` clone, so a concurrent
/// writer can never expose a partially-updated value.
#[derive(Default)]
pub struct SnapshotSlot {
    slot: RwLock<Option<Arc<SubmissionEnvelope>>>,
}

impl SnapshotSlot {
    pub fn set(&self, envelope: SubmissionEnvelope) {
        *self.slot.write() = Some(Arc::new(envelope));
    }

    pub fn get(&self) -> Option<Arc<SubmissionEnvelope>> {
        self.slot.read().clone()
    }

    /// JSON for the wire: the snapshot, or `null` when none was accepted
    /// yet.
    pub fn to_json(&self) -> String {
        match self.get() {
            Some(envelope) => serde_json::to_string(envelope.as_ref()).unwrap_or_else(|e| {
                warn!(%e, "failed to serialize cached snapshot");
                String::from("null")
            }),
            None => String::from("null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(session: &str) -> SubmissionEnvelope {
        SubmissionEnvelope {
            method: String::from("POST"),
            uri: String::from("/api/data"),
            headers: Default::default(),
            received_at: 0,
            body: json!({"sessionId": session}),
        }
    }

    #[test]
    fn empty_slot_reads_as_null() {
        let slot = SnapshotSlot::default();
        assert!(slot.get().is_none());
        assert_eq!(slot.to_json(), "null");
    }

    #[test]
    fn last_writer_wins() {
        let slot = SnapshotSlot::default();
        slot.set(envelope("s1"));
        slot.set(envelope("s2"));
        let current = slot.get().expect("slot filled");
        assert_eq!(current.body["sessionId"], "s2");
    }
}
