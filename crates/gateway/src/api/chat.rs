//! Chat API endpoints.
//!
//! - `POST /v1/chat` returns the full reply as JSON
//! - `POST /v1/chat-stream` streams the reply over SSE
//! - `POST /v1/chat-stream/regenerate` streams a replacement for the last reply
//! - `POST /v1/chat-human-feedback` streams two parallel variants

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;

use ck_domain::chat::ChatRequest;
use ck_domain::error::Error;

use super::context::{context_from_headers, select_deployment};
use super::error::ApiError;
use super::extract::ValidJson;
use crate::runtime::parallel::ParallelPair;
use crate::runtime::{self, process_chat, process_regeneration, StreamJob, WireEvent};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat (non-streaming)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidJson(body): ValidJson<ChatRequest>,
) -> Result<Response, ApiError> {
    let ctx = context_from_headers(&headers);
    let (adapter, ctx) = select_deployment(&state, &headers, ctx)?;
    let processed =
        process_chat(state.store.as_ref(), &state.tools, &state.config.chat, body, ctx).await?;

    let (mut rx, handle) = runtime::start_stream(&state, adapter, StreamJob::from_processed(processed));

    // Drain so the orchestrator never blocks on a full channel.
    while rx.recv().await.is_some() {}

    let outcome = handle
        .await
        .map_err(|e| Error::Other(format!("chat task failed: {e}")))?;

    let mut body = serde_json::json!({
        "response_id": outcome.message_id,
        "generation_id": outcome.generation_id,
        "conversation_id": outcome.conversation_id,
        "text": outcome.text,
        "citations": outcome.citations,
        "tool_calls": outcome.tool_calls,
        "finish_reason": outcome.finish_reason,
    });
    if let Some(error) = outcome.error {
        body["error"] = serde_json::Value::String(error);
    }
    Ok(Json(body).into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat-stream (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidJson(body): ValidJson<ChatRequest>,
) -> Result<Response, ApiError> {
    let ctx = context_from_headers(&headers);
    let (adapter, ctx) = select_deployment(&state, &headers, ctx)?;
    let processed =
        process_chat(state.store.as_ref(), &state.tools, &state.config.chat, body, ctx).await?;

    let (rx, _handle) = runtime::start_stream(&state, adapter, StreamJob::from_processed(processed));
    Ok(sse_response(&state, rx, None))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat-stream/regenerate (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn regenerate(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidJson(body): ValidJson<ChatRequest>,
) -> Result<Response, ApiError> {
    let ctx = context_from_headers(&headers);
    let (adapter, ctx) = select_deployment(&state, &headers, ctx)?;
    let processed =
        process_regeneration(state.store.as_ref(), &state.tools, &state.config.chat, body, ctx)
            .await?;

    let job = StreamJob::from_processed(processed.chat).with_previous_ids(processed.superseded_ids);
    let (rx, _handle) = runtime::start_stream(&state, adapter, job);
    Ok(sse_response(&state, rx, None))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat-human-feedback (SSE, parallel)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Chat request plus an optional `human_feedback` field that clients may
/// send. The field is accepted and dropped.
#[derive(Debug, Deserialize)]
pub struct HumanFeedbackRequest {
    #[serde(flatten)]
    pub chat: ChatRequest,
    #[serde(default)]
    pub human_feedback: Option<serde_json::Value>,
}

pub async fn human_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidJson(body): ValidJson<HumanFeedbackRequest>,
) -> Result<Response, ApiError> {
    if body.human_feedback.is_some() {
        tracing::debug!("ignoring human_feedback field");
    }

    let ctx = context_from_headers(&headers);
    let stream_id = ctx.stream_id.clone();
    let (adapter, ctx) = select_deployment(&state, &headers, ctx)?;
    let pair = ParallelPair::prepare(
        state.store.as_ref(),
        &state.tools,
        &state.config.chat,
        body.chat,
        ctx,
    )
    .await?;

    tracing::info!(
        group_id = %pair.group_id,
        conversation_id = %pair.chat.conversation_id(),
        "starting parallel generation"
    );
    let (rx, _handles) = runtime::start_parallel(&state, adapter, pair);
    Ok(sse_response(&state, rx, stream_id))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE plumbing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn sse_response(
    state: &AppState,
    rx: mpsc::Receiver<WireEvent>,
    stream_id: Option<String>,
) -> Response {
    let ping = Duration::from_secs(state.config.server.stream.ping_interval_secs);
    let mut resp = Sse::new(make_sse_stream(rx))
        .keep_alive(KeepAlive::new().interval(ping))
        .into_response();

    let headers = resp.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    if let Some(value) = stream_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        headers.insert("x-stream-id", value);
    }
    resp
}

/// Dropping the returned stream (client disconnect) drops `rx`, which the
/// orchestrator observes as cancellation.
fn make_sse_stream(
    mut rx: mpsc::Receiver<WireEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(event.event_type.as_str()).data(data));
        }
    }
}
