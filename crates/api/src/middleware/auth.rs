//! Bearer token authentication for `/api` routes.
//!
//! Provides an `ApiClient` Axum extractor that validates the Authorization
//! header against the configured `API_AUTH_TOKEN`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use relay_common::error::AppError;

use crate::state::AppState;

/// Proof that the caller presented the configured API token.
///
/// Use as an Axum extractor on protected routes:
/// ```ignore
/// async fn handler(_auth: ApiClient) -> impl IntoResponse {
///     // only reached with a valid token
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ApiClient;

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").map(str::trim)
}

/// Compare tokens without short-circuiting on the first differing byte.
pub fn token_matches(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl FromRequestParts<AppState> for ApiClient {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let authorized = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .is_some_and(|token| token_matches(token, &state.config.api_auth_token));

        async move {
            if authorized {
                Ok(ApiClient)
            } else {
                Err(AppError::Auth("Unauthorized".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn test_token_matches() {
        assert!(token_matches("secret", "secret"));
        assert!(!token_matches("secreT", "secret"));
        assert!(!token_matches("secret2", "secret"));
        assert!(!token_matches("", "secret"));
    }
}
