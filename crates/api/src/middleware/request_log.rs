//! One structured log line per processed request.

use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::header::CONTENT_LENGTH;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use relay_common::error::AppError;

/// Bodies above this size are forwarded untouched and left out of the log.
const MAX_LOGGED_BODY_BYTES: usize = 16 * 1024;

pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let (request, body) = match capture_body(request).await {
        Ok(captured) => captured,
        Err(e) => return e.into_response(),
    };

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        body = body.as_deref(),
        "Request processed"
    );

    response
}

/// Buffer a small, declared-length body so it can be logged, then hand an
/// identical request back.
async fn capture_body(request: Request) -> Result<(Request, Option<String>), AppError> {
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    match declared {
        Some(len) if len > 0 && len <= MAX_LOGGED_BODY_BYTES => {}
        _ => return Ok((request, None)),
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_LOGGED_BODY_BYTES)
        .await
        .map_err(|_| AppError::Validation("Failed to read request body".to_string()))?;

    let logged = loggable_body(&bytes);
    Ok((Request::from_parts(parts, Body::from(bytes)), logged))
}

/// Compact JSON when the body parses as JSON, lossy text otherwise.
fn loggable_body(bytes: &Bytes) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(serde_json::Value::Object(map)) if map.is_empty() => None,
        Ok(value) => Some(value.to_string()),
        Err(_) => Some(String::from_utf8_lossy(bytes).into_owned()),
    }
}
