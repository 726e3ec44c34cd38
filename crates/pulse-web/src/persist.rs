//! Per-kind save helpers over the document store: shape-check the record,
//! then upsert (identity present) or append (identity-less).

use pulse_types::{Device, Sensor, SensorDataPoint, SubmissionEnvelope};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::store::{DEVICES, DocumentStore, REQUEST_DATA, SENSOR_DATA, SENSORS, StoreError};

fn encode<T: Serialize>(
    kind: &'static str,
    collection: &str,
    record: &T,
) -> Result<Value, StoreError> {
    serde_json::to_value(record).map_err(|e| StoreError::Write {
        collection: collection.into(),
        reason: format!("encode {kind}: {e}"),
    })
}

/// Upsert when the document carries a string `id`, plain append otherwise.
pub async fn save(
    store: &dyn DocumentStore,
    collection: &str,
    doc: Value,
) -> Result<(), StoreError> {
    match doc.get("id").and_then(Value::as_str).map(str::to_owned) {
        Some(id) => store.upsert(collection, &id, doc).await,
        None => store.insert(collection, doc).await,
    }
}

pub async fn save_device(store: &dyn DocumentStore, device: &Device) -> Result<(), StoreError> {
    if device.id.is_empty() {
        return Err(StoreError::InvalidRecord {
            kind: "device",
            reason: "empty id",
        });
    }
    save(store, DEVICES, encode("device", DEVICES, device)?).await?;
    debug!(device_id = %device.id, "device upserted");
    Ok(())
}

pub async fn save_sensor(store: &dyn DocumentStore, sensor: &Sensor) -> Result<(), StoreError> {
    if sensor.id.is_empty() || sensor.device_id.is_empty() {
        return Err(StoreError::InvalidRecord {
            kind: "sensor",
            reason: "empty id or deviceId",
        });
    }
    save(store, SENSORS, encode("sensor", SENSORS, sensor)?).await?;
    debug!(sensor_id = %sensor.id, "sensor upserted");
    Ok(())
}

/// Always an append: readings carry no identity and history accumulates.
pub async fn save_data_point(
    store: &dyn DocumentStore,
    point: &SensorDataPoint,
) -> Result<(), StoreError> {
    if point.sensor_id.is_empty() || point.device_id.is_empty() {
        return Err(StoreError::InvalidRecord {
            kind: "sensor data point",
            reason: "empty sensorId or deviceId",
        });
    }
    store
        .insert(SENSOR_DATA, encode("sensor data point", SENSOR_DATA, point)?)
        .await?;
    debug!(sensor_id = %point.sensor_id, "data point appended");
    Ok(())
}

/// Audit-log append of the accepted submission as received.
pub async fn save_raw_submission(
    store: &dyn DocumentStore,
    envelope: &SubmissionEnvelope,
) -> Result<(), StoreError> {
    store
        .insert(
            REQUEST_DATA,
            encode("submission envelope", REQUEST_DATA, envelope)?,
        )
        .await?;
    debug!(uri = %envelope.uri, "raw submission appended to audit log");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn save_routes_on_identity_presence() {
        let store = MemoryStore::default();
        save(&store, "things", json!({"id": "t1", "v": 1}))
            .await
            .expect("keyed save");
        save(&store, "things", json!({"id": "t1", "v": 2}))
            .await
            .expect("keyed save again");
        save(&store, "things", json!({"v": 3})).await.expect("unkeyed save");

        assert_eq!(store.keyed_len("things"), 1, "same id upserts in place");
        assert_eq!(store.get("things", "t1").expect("doc")["v"], 2);
        assert_eq!(store.log_rows("things").len(), 1, "identity-less doc appended");
    }

    #[tokio::test]
    async fn shape_checks_fail_fast_before_any_write() {
        let store = MemoryStore::default();
        let device = Device {
            id: String::new(),
            name: String::from("x"),
            description: String::new(),
            created_at: 0,
        };
        let err = save_device(&store, &device).await.expect_err("empty id");
        assert!(matches!(err, StoreError::InvalidRecord { kind: "device", .. }));
        assert_eq!(store.keyed_len(DEVICES), 0, "nothing written");
    }

    #[tokio::test]
    async fn data_points_append_even_when_identical() {
        let store = MemoryStore::default();
        let point = SensorDataPoint {
            sensor_id: String::from("d1-temp"),
            device_id: String::from("d1"),
            session_id: String::from("s1"),
            time: 1000.into(),
            timestamp: 1,
            values: json!({"c": 21.5}).as_object().cloned().unwrap_or_default(),
        };
        save_data_point(&store, &point).await.expect("first append");
        save_data_point(&store, &point).await.expect("second append");
        assert_eq!(store.log_rows(SENSOR_DATA).len(), 2);
    }
}
