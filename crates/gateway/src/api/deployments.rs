use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// `GET /v1/deployments`: configured deployments, including ones that
/// failed to initialize.
pub async fn list_deployments(State(state): State<AppState>) -> impl IntoResponse {
    let deployments = state.deployments.list();
    Json(serde_json::json!({
        "deployments": deployments,
        "count": deployments.len(),
    }))
}
