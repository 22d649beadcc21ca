//! Session authentication.
//!
//! Resolves the auth library's session cookie (or a bearer token) to the
//! signed-in user. Handlers that take [`AuthUser`] reject anonymous requests
//! with 401 before doing anything else.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use storefront_core::{SessionToken, UserSession};

use crate::error::ApiError;
use crate::state::AppState;

/// The signed-in user
#[derive(Clone, Debug)]
pub struct AuthUser(pub UserSession);

/// Session token from the cookie, falling back to `Authorization: Bearer`
fn extract_token(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(SessionToken::from_cookie_header)
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(SessionToken::from_bearer)
        })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers).ok_or(ApiError::Unauthorized)?;

        let session = state
            .sessions
            .resolve(&token)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        tracing::debug!(user_id = %session.user_id, "Authenticated request");
        Ok(Self(session))
    }
}
