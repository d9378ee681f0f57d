//! Liveness check with per-channel backlog.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use relay_common::types::Channel;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let depth = |channel: Channel| state.dispatcher.queue(channel).len();

    Json(json!({
        "status": "ok",
        "service": "relay-api",
        "version": env!("CARGO_PKG_VERSION"),
        "queues": {
            "email": depth(Channel::Email),
            "sms": depth(Channel::Sms),
        }
    }))
}
