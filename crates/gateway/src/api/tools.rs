use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// `GET /v1/tools`: visible tool definitions, sorted by name.
pub async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.tools.list_visible())
}
