//! Structural validation of inbound submissions.
//!
//! Two levels with different blast radius: a malformed top level rejects
//! the whole request before any side effect, while a malformed payload
//! item is skipped on its own and never aborts its siblings.

use pulse_types::{PayloadItem, SubmissionBody};
use serde_json::Value;

fn string_field(body: &Value, name: &str) -> Option<String> {
    body.get(name).and_then(Value::as_str).map(str::to_owned)
}

/// Top-level check: the body must be an object carrying a non-empty string
/// `deviceId`, a string `sessionId`, and a `payload` array. Returns the
/// typed submission or the reason it was rejected.
pub fn parse_submission(body: &Value) -> Result<SubmissionBody, String> {
    if !body.is_object() {
        return Err(String::from("body is not a JSON object"));
    }
    let device_id =
        string_field(body, "deviceId").ok_or("missing or non-string field `deviceId`")?;
    if device_id.trim().is_empty() {
        return Err(String::from("field `deviceId` is empty"));
    }
    let session_id =
        string_field(body, "sessionId").ok_or("missing or non-string field `sessionId`")?;
    let payload = body
        .get("payload")
        .and_then(Value::as_array)
        .ok_or("missing or non-array field `payload`")?
        .clone();

    Ok(SubmissionBody {
        device_id,
        session_id,
        payload,
        // Non-string values are treated as absent rather than rejected.
        device_name: string_field(body, "deviceName"),
        device_description: string_field(body, "deviceDescription"),
    })
}

/// Item-level check: a non-empty string `name`, a numeric `time`, and a
/// non-null object `values`. An item without a numeric `time` is rejected
/// here, never defaulted.
pub fn parse_payload_item(item: &Value) -> Option<PayloadItem> {
    let name = item.get("name")?.as_str()?;
    if name.trim().is_empty() {
        return None;
    }
    let time = match item.get("time")? {
        Value::Number(n) => n.clone(),
        _ => return None,
    };
    let values = item.get("values")?.as_object()?.clone();
    Some(PayloadItem {
        name: name.to_owned(),
        time,
        values,
    })
}
