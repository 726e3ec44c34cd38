//! The single ingestion path, dispatched by request shape: a WebSocket
//! upgrade subscribes a viewer, a POST submits telemetry, a plain GET polls
//! the latest snapshot.

use std::collections::BTreeMap;

use axum::body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header, request::Parts};
use axum::response::{IntoResponse, Response};
use pulse_types::SubmissionEnvelope;
use tracing::{error, warn};

use crate::app::AppState;
use crate::hub::session::run_viewer;
use crate::ingest::{self, IngestError};
use crate::util::time::now_ms;

const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

const JSON_CONTENT_TYPE: (header::HeaderName, &str) =
    (header::CONTENT_TYPE, "application/json; charset=utf-8");

/// GET side of the path: upgrade requests become viewer sessions, plain
/// requests read the snapshot slot.
pub async fn data_get(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade {
        Ok(upgrade) => upgrade.on_upgrade(move |socket| run_viewer(state, socket)),
        Err(_) => (StatusCode::OK, [JSON_CONTENT_TYPE], state.snapshot.to_json()).into_response(),
    }
}

/// POST side: run the ingestion pipeline and map its error kinds onto
/// status codes. Malformed submissions get a descriptive rejection rather
/// than a generic server error.
pub async fn data_post(State(state): State<AppState>, request: Request) -> Response {
    let (parts, raw_body) = request.into_parts();
    let bytes = match body::to_bytes(raw_body, BODY_LIMIT_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%e, "failed to read submission body");
            return (StatusCode::BAD_REQUEST, "unreadable request body").into_response();
        }
    };
    let body: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(body) => body,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("request body is not valid JSON: {e}"),
            )
                .into_response();
        }
    };

    let envelope = envelope_from_parts(&parts, body);
    match ingest::handle_submission(&state, envelope).await {
        Ok(outcome) => (
            StatusCode::OK,
            format!(
                "submission accepted: {} stored, {} skipped, {} failed",
                outcome.accepted_items, outcome.skipped_items, outcome.failed_items
            ),
        )
            .into_response(),
        Err(IngestError::Validation(reason)) => (
            StatusCode::BAD_REQUEST,
            format!("invalid submission: {reason}"),
        )
            .into_response(),
        Err(e) => {
            error!(%e, "submission processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to process submission",
            )
                .into_response()
        }
    }
}

/// The audited/broadcast record: request metadata plus the parsed body.
/// Header values that are not UTF-8 are dropped rather than mangled.
fn envelope_from_parts(parts: &Parts, body: serde_json::Value) -> SubmissionEnvelope {
    let mut headers = BTreeMap::new();
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_owned(), value.to_owned());
        }
    }
    SubmissionEnvelope {
        method: parts.method.to_string(),
        uri: parts.uri.to_string(),
        headers,
        received_at: now_ms(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::json;

    #[test]
    fn envelope_captures_request_metadata() {
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/data")
            .header("content-type", "application/json")
            .body(())
            .expect("build request");
        let (parts, ()) = request.into_parts();

        let envelope = envelope_from_parts(&parts, json!({"deviceId": "d1"}));
        assert_eq!(envelope.method, "POST");
        assert_eq!(envelope.uri, "/api/data");
        assert_eq!(
            envelope.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(envelope.body["deviceId"], "d1");
        assert!(envelope.received_at > 0);
    }
}
