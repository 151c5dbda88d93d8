use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::UserProfile;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, UserId};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpdateProfileForm {
    pub name: Option<String>,
    pub city: Option<String>,
}

#[derive(Deserialize)]
pub struct RegisterProfileForm {
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub city: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/profile",
        get(get_profile).patch(update_profile).put(register_profile),
    )
}

/// Blank strings clear the field
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn get_profile(user: CurrentUser) -> Json<Value> {
    Json(json!({ "user": user.profile }))
}

async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(form): Json<UpdateProfileForm>,
) -> AppResult<Json<Value>> {
    let name = non_blank(form.name);
    let city = non_blank(form.city);

    let profile = state
        .profiles
        .update_details(&user.id, name.as_deref(), city.as_deref())
        .await?;

    Ok(Json(json!({ "user": profile })))
}

async fn register_profile(
    State(state): State<AppState>,
    UserId(id): UserId,
    Json(form): Json<RegisterProfileForm>,
) -> AppResult<Json<Value>> {
    let email = form.email.trim().to_string();
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".into()));
    }

    let profile = state
        .profiles
        .upsert(&UserProfile {
            id,
            name: non_blank(form.name),
            email,
            image: non_blank(form.image),
            city: non_blank(form.city),
        })
        .await?;
    tracing::info!("Registered profile {}", profile.id);

    Ok(Json(json!({ "user": profile })))
}
