use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::db::models::UserProfile;
use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the caller's identity, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller's user id, whether or not a profile exists yet.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

impl FromRequestParts<AppState> for UserId {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| UserId(id.to_string()))
            .ok_or(AppError::Unauthorized)
    }
}

/// Represents the currently authenticated user.
/// Returns 401 unless the caller has a profile.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub profile: UserProfile,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let UserId(id) = UserId::from_request_parts(parts, state).await?;
        let profile = state
            .profiles
            .get(&id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(CurrentUser { id, profile })
    }
}
