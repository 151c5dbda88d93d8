use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{BucketItem, ItemFields, CATEGORIES, TIMEFRAMES};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ItemForm {
    pub title: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub timeframe: Option<String>,
}

impl ItemForm {
    fn into_fields(self) -> AppResult<ItemFields> {
        let title = self.title.unwrap_or_default().trim().to_string();
        let category = self.category.unwrap_or_default().trim().to_string();
        let timeframe = self.timeframe.unwrap_or_default().trim().to_string();

        if title.is_empty() || category.is_empty() || timeframe.is_empty() {
            return Err(AppError::BadRequest(
                "Title, category, and timeframe are required".into(),
            ));
        }
        if !CATEGORIES.contains(&category.as_str()) {
            return Err(AppError::BadRequest(format!("Unknown category: {}", category)));
        }
        if !TIMEFRAMES.contains(&timeframe.as_str()) {
            return Err(AppError::BadRequest(format!(
                "Unknown timeframe: {}",
                timeframe
            )));
        }

        let location = self
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        Ok(ItemFields {
            title,
            category,
            location,
            timeframe,
        })
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/bucket-items", get(list_items).post(create_item))
        .route(
            "/api/bucket-items/{id}",
            put(update_item).delete(delete_item),
        )
}

/// Load an item and check the caller owns it
async fn owned_item(state: &AppState, user: &CurrentUser, id: &str) -> AppResult<BucketItem> {
    let item = state.items.get(id).await?.ok_or(AppError::NotFound)?;
    if item.user_id != user.id {
        return Err(AppError::Forbidden);
    }
    Ok(item)
}

async fn list_items(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let items = state.items.list_for_owner(&user.id).await?;
    Ok(Json(json!({ "items": items })))
}

async fn create_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(form): Json<ItemForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let fields = form.into_fields()?;
    let item = state.items.create(&user.id, &fields).await?;
    tracing::debug!("User {} added item {}", user.id, item.id);

    Ok((StatusCode::CREATED, Json(json!({ "item": item }))))
}

async fn update_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(form): Json<ItemForm>,
) -> AppResult<Json<Value>> {
    owned_item(&state, &user, &id).await?;
    let fields = form.into_fields()?;
    let item = state.items.update(&id, &fields).await?;

    Ok(Json(json!({ "item": item })))
}

async fn delete_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    owned_item(&state, &user, &id).await?;
    if !state.items.delete(&id).await? {
        return Err(AppError::NotFound);
    }

    Ok(Json(json!({ "message": "Item deleted" })))
}
