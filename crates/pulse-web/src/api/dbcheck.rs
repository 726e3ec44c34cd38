use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{error, info};

use crate::app::AppState;

/// Drives the connection bootstrapper and reports whether a storage handle
/// could be established. No side effects beyond establishing or reusing
/// the shared connection.
pub async fn dbcheck(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.handle().await {
        Ok(store) => match store.ping().await {
            Ok(()) => {
                info!("storage check completed");
                (StatusCode::OK, String::from("storage connected")).into_response()
            }
            Err(e) => {
                error!(%e, "storage ping failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("storage ping failed: {e}"),
                )
                    .into_response()
            }
        },
        Err(e) => {
            error!(%e, "storage connection failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("storage connection failed: {e}"),
            )
                .into_response()
        }
    }
}
