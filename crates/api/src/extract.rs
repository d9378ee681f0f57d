//! Body and query extractors whose rejections use the `{"error": ...}` shape.

use axum::extract::{FromRequest, FromRequestParts};

use relay_common::error::AppError;

/// `axum::Json` with malformed bodies reported as [`AppError::Validation`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` with malformed query strings reported as
/// [`AppError::Validation`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);
