use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::db::models::{Message, NewMessage, UserProfile};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderSummary {
    pub id: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender: SenderSummary,
}

impl MessageView {
    fn new(message: Message, sender: Option<&UserProfile>) -> Self {
        let sender = SenderSummary {
            id: message.sender_id.clone(),
            name: sender.and_then(|p| p.name.clone()),
            image: sender.and_then(|p| p.image.clone()),
        };
        Self { message, sender }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationQuery {
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendForm {
    pub receiver_id: Option<String>,
    pub content: Option<String>,
    pub match_id: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/messages", get(list_messages).post(send_message))
        .route("/api/messages/stream", get(message_events))
}

async fn list_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ConversationQuery>,
) -> AppResult<Json<Value>> {
    let other_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("userId parameter required".into()))?;

    let messages = state.messages.list_between(&user.id, &other_id).await?;

    let mut sender_ids: Vec<String> = messages.iter().map(|m| m.sender_id.clone()).collect();
    sender_ids.sort();
    sender_ids.dedup();
    let senders: HashMap<String, UserProfile> = state
        .profiles
        .get_profiles(&sender_ids)
        .await?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    let views: Vec<MessageView> = messages
        .into_iter()
        .map(|m| {
            let sender = senders.get(&m.sender_id);
            MessageView::new(m, sender)
        })
        .collect();

    Ok(Json(json!({ "messages": views })))
}

async fn send_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(form): Json<SendForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let receiver_id = form.receiver_id.unwrap_or_default();
    let content = form.content.unwrap_or_default().trim().to_string();
    if receiver_id.is_empty() || content.is_empty() {
        return Err(AppError::BadRequest(
            "receiverId and content are required".into(),
        ));
    }
    if state.profiles.get(&receiver_id).await?.is_none() {
        return Err(AppError::BadRequest(format!("Unknown receiver: {}", receiver_id)));
    }

    let match_id = form.match_id.filter(|id| !id.is_empty());
    if let Some(ref id) = match_id {
        // The match must exist and be between these two users
        let linked = state
            .matches
            .get(id)
            .await?
            .is_some_and(|m| m.involves(&user.id) && m.involves(&receiver_id));
        if !linked {
            return Err(AppError::BadRequest(format!("Unknown match: {}", id)));
        }
    }

    let message = state
        .messages
        .insert(&NewMessage {
            sender_id: user.id.clone(),
            receiver_id,
            match_id,
            content,
        })
        .await?;

    let delivered = state.hub.publish(message.clone());
    tracing::debug!("Message {} pushed to {} subscribers", message.id, delivered);

    let view = MessageView::new(message, Some(&user.profile));
    Ok((StatusCode::CREATED, Json(json!({ "message": view }))))
}

/// SSE stream of new messages sent by or addressed to the caller
async fn message_events(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = user.id;
    let stream = BroadcastStream::new(state.hub.subscribe()).filter_map(move |received| {
        // Lagged receivers skip what they missed
        let message = received.ok()?;
        if message.sender_id != user_id && message.receiver_id != user_id {
            return None;
        }
        Event::default()
            .event("message")
            .json_data(&message)
            .ok()
            .map(Ok)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
