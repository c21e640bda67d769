//! Conversation read endpoints.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use ck_domain::error::Error;
use ck_domain::message::Message;
use ck_store::MessageStore;

use super::context::context_from_headers;
use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListMessagesQuery {
    /// Hide superseded messages.
    #[serde(default)]
    pub active_only: bool,
}

/// `GET /v1/conversations/:id/messages`: the caller's messages in order,
/// active and superseded alike unless `?active_only=true`.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Response, ApiError> {
    let ctx = context_from_headers(&headers);
    let messages: Vec<Message> = state
        .store
        .list_messages(&conversation_id, query.active_only)
        .await?
        .into_iter()
        .filter(|m| m.user_id == ctx.user_id)
        .collect();

    if messages.is_empty() {
        return Err(Error::not_found("conversation", conversation_id).into());
    }

    Ok(Json(serde_json::json!({
        "conversation_id": conversation_id,
        "messages": messages,
        "count": messages.len(),
    }))
    .into_response())
}
