use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::db::models::{MatchStatus, UserProfile};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::matching::{MatchResult, SharedItem};
use crate::state::AppState;

/// A stored match seen from the caller's side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub match_id: String,
    pub user: UserProfile,
    pub shared_items_count: i64,
    pub shared_items: Vec<SharedItem>,
    pub status: MatchStatus,
}

#[derive(Deserialize)]
pub struct StatusForm {
    pub status: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/matches", get(list_matches))
        .route("/api/matches/{id}", patch(update_status))
}

/// Recomputes matches (writing records) before listing every stored match.
async fn list_matches(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let fresh = state.engine.refresh_matches(&user.id).await?;
    let records = state.matches.list_for_user(&user.id).await?;

    let mut other_ids: Vec<String> = records
        .iter()
        .map(|r| r.other_user(&user.id).to_string())
        .collect();
    other_ids.sort();
    other_ids.dedup();

    let profiles: HashMap<String, UserProfile> = state
        .profiles
        .get_profiles(&other_ids)
        .await?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();
    let computed: HashMap<&str, &MatchResult> =
        fresh.iter().map(|m| (m.user.id.as_str(), m)).collect();

    let matches: Vec<MatchView> = records
        .into_iter()
        .filter_map(|record| {
            let other_id = record.other_user(&user.id);
            let profile = profiles.get(other_id)?.clone();
            let shared_items = computed
                .get(other_id)
                .map(|m| m.shared_items.clone())
                .unwrap_or_default();
            Some(MatchView {
                match_id: record.id.clone(),
                user: profile,
                shared_items_count: record.shared_items_count,
                shared_items,
                status: record.status,
            })
        })
        .collect();

    Ok(Json(json!({ "matches": matches })))
}

async fn update_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(form): Json<StatusForm>,
) -> AppResult<Json<Value>> {
    let status: MatchStatus = form
        .status
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid status".into()))?;

    let record = state.matches.get(&id).await?.ok_or(AppError::NotFound)?;
    if !record.involves(&user.id) {
        return Err(AppError::Forbidden);
    }

    let updated = state.matches.set_status(&id, status).await?;
    tracing::info!("User {} set match {} to {}", user.id, id, status);

    Ok(Json(json!({ "match": updated })))
}
