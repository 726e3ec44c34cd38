//! Shared data model for the pulse telemetry pipeline: the records the
//! server persists, the submission shapes devices send, and the envelope
//! that is cached, audited, and broadcast to viewers.
//!
//! Field names serialize in camelCase so stored documents and broadcast
//! events keep the same spelling devices and viewers use on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A remote source of sensor readings, upserted into the `devices`
/// collection whenever a submission from that device arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: i64,
}

/// One named measurement channel on one device. Identity is the composite
/// `{deviceId}-{name}`, so a (device, sensor) pair maps to exactly one row
/// no matter how often it is seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    pub id: String,
    pub device_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub created_at: i64,
}

impl Sensor {
    /// Composite identity for a sensor. Deterministic so repeated
    /// submissions upsert the same row.
    pub fn composite_id(device_id: &str, sensor_name: &str) -> String {
        format!("{device_id}-{sensor_name}")
    }
}

/// A single reading, appended to the `sensorData` collection. Carries no
/// identity on purpose: history accumulates, nothing is ever upserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorDataPoint {
    pub sensor_id: String,
    pub device_id: String,
    pub session_id: String,
    pub time: Number,
    pub timestamp: i64,
    pub values: Map<String, Value>,
}

/// The body a device POSTs: which device, which session, and a batch of
/// payload items. `payload` stays raw JSON so one malformed item can be
/// skipped without rejecting its siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionBody {
    pub device_id: String,
    pub session_id: String,
    pub payload: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_description: Option<String>,
}

/// One validated payload item: a named reading with a numeric time and a
/// set of named values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadItem {
    pub name: String,
    pub time: Number,
    pub values: Map<String, Value>,
}

/// The accepted submission as received: request metadata plus the parsed
/// JSON body. This is what lands in the `requestData` audit log, what the
/// latest-snapshot slot holds, and what viewers receive over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionEnvelope {
    pub method: String,
    pub uri: String,
    pub headers: BTreeMap<String, String>,
    pub received_at: i64,
    pub body: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sensor_composite_id_is_deterministic() {
        assert_eq!(Sensor::composite_id("d1", "temp"), "d1-temp");
        assert_eq!(
            Sensor::composite_id("d1", "temp"),
            Sensor::composite_id("d1", "temp"),
        );
    }

    #[test]
    fn records_serialize_in_camel_case() {
        let point = SensorDataPoint {
            sensor_id: String::from("d1-temp"),
            device_id: String::from("d1"),
            session_id: String::from("s1"),
            time: Number::from(1000),
            timestamp: 42,
            values: json!({"c": 21.5}).as_object().cloned().unwrap_or_default(),
        };
        let doc = serde_json::to_value(&point).expect("serialize data point");
        assert_eq!(doc["sensorId"], "d1-temp");
        assert_eq!(doc["sessionId"], "s1");
        assert_eq!(doc["time"], 1000);
        assert_eq!(doc["values"]["c"], 21.5);

        let sensor = Sensor {
            id: String::from("d1-temp"),
            device_id: String::from("d1"),
            kind: String::from("temp"),
            description: String::new(),
            created_at: 0,
        };
        let doc = serde_json::to_value(&sensor).expect("serialize sensor");
        assert_eq!(doc["type"], "temp", "kind must serialize as `type`");
        assert_eq!(doc["deviceId"], "d1");
    }

    #[test]
    fn submission_body_round_trips_optional_fields() {
        let body: SubmissionBody = serde_json::from_value(json!({
            "deviceId": "d1",
            "sessionId": "s1",
            "payload": [{"name": "temp", "time": 1000, "values": {"c": 21.5}}],
        }))
        .expect("deserialize minimal body");
        assert_eq!(body.device_id, "d1");
        assert!(body.device_name.is_none());

        let doc = serde_json::to_value(&body).expect("serialize body");
        assert!(
            doc.get("deviceName").is_none(),
            "absent optional fields must not serialize"
        );
    }
}
