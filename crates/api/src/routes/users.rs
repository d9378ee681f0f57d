//! User registration and lookup routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::Deserialize;

use relay_common::error::AppError;
use relay_common::types::{Preferences, User, UserId};
use relay_engine::{DirectoryError, NewUser, UserFilter, UserPatch};

use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::auth::ApiClient;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", post(create_user).put(upsert_user).get(get_user))
        .route("/api/users/preferences", put(update_preferences))
}

/// Request body for a preferences update.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
    pub preferences: Preferences,
}

/// POST /api/users: Register a new user.
async fn create_user(
    State(state): State<AppState>,
    _auth: ApiClient,
    ApiJson(input): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state.directory.lock().create(input)?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /api/users: Update the matching user, or create one.
async fn upsert_user(
    State(state): State<AppState>,
    _auth: ApiClient,
    ApiJson(patch): ApiJson<UserPatch>,
) -> Result<Json<User>, AppError> {
    let user = state.directory.lock().upsert(patch)?;
    Ok(Json(user))
}

/// PUT /api/users/preferences: Replace the channel preferences of an existing user.
async fn update_preferences(
    State(state): State<AppState>,
    _auth: ApiClient,
    ApiJson(update): ApiJson<PreferencesUpdate>,
) -> Result<Json<User>, AppError> {
    let filter = UserFilter {
        user_id: update.user_id,
        email: update.email,
        telephone: update.telephone,
    };
    if filter.is_empty() {
        return Err(DirectoryError::MissingIdentifier.into());
    }

    let mut directory = state.directory.lock();
    let user_id = directory
        .get_one(&filter)
        .map(|user| user.user_id)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let user = directory.upsert(UserPatch {
        user_id: Some(user_id),
        preferences: Some(update.preferences),
        ..UserPatch::default()
    })?;

    tracing::info!(
        user_id,
        email_enabled = user.preferences.email,
        sms_enabled = user.preferences.sms,
        "Preferences updated"
    );

    Ok(Json(user))
}

/// GET /api/users?userId=&email=&telephone=: Look up a single user.
async fn get_user(
    State(state): State<AppState>,
    _auth: ApiClient,
    ApiQuery(filter): ApiQuery<UserFilter>,
) -> Result<Json<User>, AppError> {
    if filter.is_empty() {
        return Err(AppError::Validation(
            "User ID, email, or telephone is required".to_string(),
        ));
    }

    state
        .directory
        .lock()
        .get_one(&filter)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}
