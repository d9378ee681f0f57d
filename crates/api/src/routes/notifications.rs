//! Notification intake route.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use relay_common::error::AppError;
use relay_engine::DispatchRequest;

use crate::extract::ApiJson;
use crate::middleware::auth::ApiClient;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notification", post(send_notification))
}

/// POST /api/notification: Queue a message on every channel the user enabled.
///
/// Answers 202 once the messages are queued; delivery happens afterwards.
async fn send_notification(
    State(state): State<AppState>,
    _auth: ApiClient,
    ApiJson(request): ApiJson<DispatchRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let outcome = state.dispatcher.dispatch(&request)?;

    let message = if outcome.is_noop() {
        "No notification channels enabled"
    } else {
        "Notifications queued"
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": message,
            "userId": outcome.user_id,
            "channels": outcome.channels,
        })),
    ))
}
