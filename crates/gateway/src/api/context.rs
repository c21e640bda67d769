//! Request headers → [`Context`] and deployment selection.

use std::sync::Arc;

use axum::http::HeaderMap;

use ck_domain::context::{Context, ANONYMOUS_USER};
use ck_domain::error::Result;
use ck_providers::GenerationAdapter;

use crate::state::AppState;

pub const USER_ID_HEADER: &str = "user-id";
pub const ORGANIZATION_ID_HEADER: &str = "organization-id";
pub const DEPLOYMENT_NAME_HEADER: &str = "deployment-name";
pub const STREAM_ID_HEADER: &str = "stream-id";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Seed a context from the identity headers.
pub fn context_from_headers(headers: &HeaderMap) -> Context {
    Context::new()
        .with_user(header(headers, USER_ID_HEADER).unwrap_or_else(|| ANONYMOUS_USER.into()))
        .with_organization(header(headers, ORGANIZATION_ID_HEADER))
        .with_stream_id(header(headers, STREAM_ID_HEADER))
}

/// Resolve the deployment named by `Deployment-Name`, or the default one.
/// Runs before any normalization so a bad header creates no rows.
pub fn select_deployment(
    state: &AppState,
    headers: &HeaderMap,
    ctx: Context,
) -> Result<(Arc<dyn GenerationAdapter>, Context)> {
    let requested = header(headers, DEPLOYMENT_NAME_HEADER);
    let adapter = state.deployments.select(requested.as_deref())?;
    let ctx = ctx.with_deployment(Some(adapter.deployment().to_owned()));
    Ok((adapter, ctx))
}
