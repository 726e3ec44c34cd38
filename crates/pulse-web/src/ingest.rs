//! The ingestion pipeline: validate, persist, cache, broadcast.
//!
//! Failure containment follows the blast radius of the data: a malformed
//! request dies here with no side effects; a malformed or unpersistable
//! payload item only loses itself; a device or sensor upsert failure is
//! logged and the request carries on. Only the audit-log append and a
//! missing storage connection fail the whole request.

use pulse_types::{Device, Sensor, SensorDataPoint, SubmissionEnvelope};
use thiserror::Error;
use tracing::{info, warn};

use crate::app::AppState;
use crate::persist;
use crate::store::StoreError;
use crate::util::time::now_ms;
use crate::validate;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The top-level request shape was malformed; nothing was persisted or
    /// broadcast.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Data points appended.
    pub accepted_items: usize,
    /// Items skipped for failing the item-level shape check.
    pub skipped_items: usize,
    /// Items lost to a persistence failure after passing validation.
    pub failed_items: usize,
}

/// Process one submission end to end. On success the envelope has been
/// audited, its records persisted, the snapshot slot updated, and the
/// event broadcast to every connected viewer.
pub async fn handle_submission(
    state: &AppState,
    envelope: SubmissionEnvelope,
) -> Result<IngestOutcome, IngestError> {
    let submission =
        validate::parse_submission(&envelope.body).map_err(IngestError::Validation)?;

    let store = state.store.handle().await?;
    persist::save_raw_submission(store.as_ref(), &envelope).await?;

    let device = Device {
        id: submission.device_id.clone(),
        name: submission
            .device_name
            .unwrap_or_else(|| String::from("Unknown Device")),
        description: submission
            .device_description
            .unwrap_or_else(|| String::from("No description")),
        created_at: now_ms(),
    };
    // Device and sensor rows are denormalized bookkeeping; losing one
    // upsert must not cost the readings in this request.
    if let Err(e) = persist::save_device(store.as_ref(), &device).await {
        warn!(device_id = %device.id, %e, "device upsert failed, continuing");
    }

    let mut outcome = IngestOutcome::default();
    for raw_item in &submission.payload {
        let Some(item) = validate::parse_payload_item(raw_item) else {
            warn!(device_id = %device.id, item = %raw_item, "skipping invalid payload item");
            outcome.skipped_items += 1;
            continue;
        };

        let sensor_id = Sensor::composite_id(&submission.device_id, &item.name);
        let sensor = Sensor {
            id: sensor_id.clone(),
            device_id: submission.device_id.clone(),
            kind: item.name.clone(),
            description: format!(
                "Sensor of type {} on device {}",
                item.name, submission.device_id
            ),
            created_at: now_ms(),
        };
        if let Err(e) = persist::save_sensor(store.as_ref(), &sensor).await {
            warn!(sensor_id = %sensor_id, %e, "sensor upsert failed, continuing");
        }

        let point = SensorDataPoint {
            sensor_id: sensor_id.clone(),
            device_id: submission.device_id.clone(),
            session_id: submission.session_id.clone(),
            time: item.time,
            timestamp: now_ms(),
            values: item.values,
        };
        match persist::save_data_point(store.as_ref(), &point).await {
            Ok(()) => outcome.accepted_items += 1,
            Err(e) => {
                warn!(sensor_id = %sensor_id, %e, "data point append failed");
                outcome.failed_items += 1;
            }
        }
    }

    state.snapshot.set(envelope.clone());
    state.hub.broadcast(&envelope);
    info!(
        device_id = %device.id,
        accepted = outcome.accepted_items,
        skipped = outcome.skipped_items,
        failed = outcome.failed_items,
        "submission processed"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::store::{
        Bootstrap, Candidate, DEVICES, MemoryConnector, MemoryStore, REQUEST_DATA, SENSOR_DATA,
        SENSORS,
    };
    use serde_json::{Value, json};

    fn test_state() -> (AppState, Arc<MemoryStore>) {
        let connector = MemoryConnector::default();
        let store = connector.store();
        let configured = Candidate {
            user: String::from("admin"),
            password: String::from("password"),
            host: String::from("localhost"),
            port: 9201,
            db_name: String::from("pulse"),
        };
        let state = AppState::new(Bootstrap::new(Box::new(connector), configured));
        (state, store)
    }

    fn envelope(body: Value) -> SubmissionEnvelope {
        SubmissionEnvelope {
            method: String::from("POST"),
            uri: String::from("/api/data"),
            headers: BTreeMap::new(),
            received_at: now_ms(),
            body,
        }
    }

    fn simple_body() -> Value {
        json!({
            "deviceId": "d1",
            "sessionId": "s1",
            "payload": [{"name": "temp", "time": 1000, "values": {"c": 21.5}}],
        })
    }

    #[tokio::test]
    async fn accepted_submission_lands_everywhere() {
        let (state, store) = test_state();
        let (_viewer, mut viewer_rx) = state.hub.register();

        let outcome = handle_submission(&state, envelope(simple_body()))
            .await
            .expect("accepted");
        assert_eq!(outcome.accepted_items, 1);

        let device = store.get(DEVICES, "d1").expect("device upserted");
        assert_eq!(device["name"], "Unknown Device");

        let sensor = store.get(SENSORS, "d1-temp").expect("sensor upserted");
        assert_eq!(sensor["type"], "temp");
        assert_eq!(sensor["deviceId"], "d1");

        let points = store.log_rows(SENSOR_DATA);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0]["sensorId"], "d1-temp");
        assert_eq!(points[0]["time"], 1000);
        assert_eq!(points[0]["values"]["c"], 21.5);

        assert_eq!(store.log_rows(REQUEST_DATA).len(), 1, "audit log appended");

        let snapshot = state.snapshot.get().expect("snapshot cached");
        assert_eq!(snapshot.body["deviceId"], "d1");

        let frame = viewer_rx.try_recv().expect("viewer got the broadcast");
        assert!(frame.contains("\"deviceId\":\"d1\""));
    }

    #[tokio::test]
    async fn invalid_items_are_skipped_and_siblings_survive() {
        let (state, store) = test_state();
        let body = json!({
            "deviceId": "d1",
            "sessionId": "s1",
            "payload": [
                {"name": "temp", "time": 1000, "values": {"c": 21.5}},
                {"name": "", "time": 1000, "values": {}},
                {"name": "hum", "values": {"rh": 40}},
                {"name": "pressure", "time": 1001, "values": {"hpa": 1013}},
            ],
        });

        let outcome = handle_submission(&state, envelope(body))
            .await
            .expect("request still succeeds");
        assert_eq!(outcome.accepted_items, 2);
        assert_eq!(outcome.skipped_items, 2);
        assert_eq!(store.log_rows(SENSOR_DATA).len(), 2, "N - K points appended");
    }

    #[tokio::test]
    async fn malformed_request_has_no_side_effects() {
        let (state, store) = test_state();
        let (_viewer, mut viewer_rx) = state.hub.register();

        let err = handle_submission(
            &state,
            envelope(json!({"deviceId": "d1", "sessionId": "s1"})),
        )
        .await
        .expect_err("payload missing");
        assert!(matches!(err, IngestError::Validation(_)));

        assert_eq!(store.log_rows(REQUEST_DATA).len(), 0, "no audit write");
        assert_eq!(store.keyed_len(DEVICES), 0, "no device write");
        assert!(state.snapshot.get().is_none(), "snapshot untouched");
        assert!(viewer_rx.try_recv().is_err(), "no broadcast");
    }

    #[tokio::test]
    async fn resubmitting_the_same_pair_never_duplicates_rows() {
        let (state, store) = test_state();
        handle_submission(&state, envelope(simple_body()))
            .await
            .expect("first");
        handle_submission(&state, envelope(simple_body()))
            .await
            .expect("second");

        assert_eq!(store.keyed_len(DEVICES), 1, "one device row");
        assert_eq!(store.keyed_len(SENSORS), 1, "one sensor row");
        assert_eq!(
            store.log_rows(SENSOR_DATA).len(),
            2,
            "but history accumulates"
        );
    }

    #[tokio::test]
    async fn device_upsert_failure_is_not_fatal() {
        let (state, store) = test_state();
        store.fail_writes_to(DEVICES);

        let outcome = handle_submission(&state, envelope(simple_body()))
            .await
            .expect("request survives a device save failure");
        assert_eq!(outcome.accepted_items, 1);
        assert_eq!(store.log_rows(SENSOR_DATA).len(), 1);
    }

    #[tokio::test]
    async fn audit_log_failure_fails_the_request() {
        let (state, store) = test_state();
        let (_viewer, mut viewer_rx) = state.hub.register();
        store.fail_writes_to(REQUEST_DATA);

        let err = handle_submission(&state, envelope(simple_body()))
            .await
            .expect_err("audit append failed");
        assert!(matches!(err, IngestError::Store(StoreError::Write { .. })));
        assert!(state.snapshot.get().is_none(), "snapshot not updated");
        assert!(viewer_rx.try_recv().is_err(), "nothing broadcast");
    }

    #[tokio::test]
    async fn data_point_failure_loses_that_item_only() {
        let (state, store) = test_state();
        store.fail_writes_to(SENSOR_DATA);

        let outcome = handle_submission(&state, envelope(simple_body()))
            .await
            .expect("request itself succeeds");
        assert_eq!(outcome.accepted_items, 0);
        assert_eq!(outcome.failed_items, 1);
        assert!(
            state.snapshot.get().is_some(),
            "request was accepted, snapshot updates"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_leave_one_intact_snapshot() {
        let (state, store) = test_state();
        let bodies: Vec<Value> = (0..8)
            .map(|i| {
                json!({
                    "deviceId": format!("d{i}"),
                    "sessionId": format!("s{i}"),
                    "payload": [{"name": "temp", "time": 1000 + i, "values": {"c": i}}],
                })
            })
            .collect();

        let mut tasks = Vec::new();
        for body in bodies.clone() {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                handle_submission(&state, envelope(body)).await
            }));
        }
        for task in tasks {
            task.await.expect("task ran").expect("submission accepted");
        }

        assert_eq!(store.log_rows(REQUEST_DATA).len(), bodies.len());
        // Whichever write landed last, the slot must hold one submitted
        // envelope whole, never a torn or foreign value.
        let snapshot = state.snapshot.get().expect("snapshot set");
        assert!(
            bodies.iter().any(|body| *body == snapshot.body),
            "snapshot must be one of the submitted bodies, got: {}",
            snapshot.body
        );
    }

    #[tokio::test]
    async fn snapshot_tracks_the_latest_accepted_submission() {
        let (state, _store) = test_state();
        handle_submission(&state, envelope(simple_body()))
            .await
            .expect("first");
        let second = json!({
            "deviceId": "d2",
            "sessionId": "s9",
            "payload": [],
        });
        handle_submission(&state, envelope(second)).await.expect("second");

        let snapshot = state.snapshot.get().expect("snapshot");
        assert_eq!(snapshot.body["deviceId"], "d2", "last accepted wins");
    }
}
