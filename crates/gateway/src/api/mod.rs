pub mod auth;
pub mod chat;
pub mod context;
pub mod conversations;
pub mod deployments;
pub mod error;
pub mod extract;
pub mod health;
pub mod tools;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the `CK_API_TOKEN` bearer-token middleware).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health::health));

    let protected = Router::new()
        // Chat
        .route("/v1/chat", post(chat::chat))
        .route("/v1/chat-stream", post(chat::chat_stream))
        .route("/v1/chat-stream/regenerate", post(chat::regenerate))
        .route("/v1/chat-human-feedback", post(chat::human_feedback))
        // Conversations
        .route(
            "/v1/conversations/:id/messages",
            get(conversations::list_messages),
        )
        // Catalogues
        .route("/v1/tools", get(tools::list_tools))
        .route("/v1/deployments", get(deployments::list_deployments))
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}
