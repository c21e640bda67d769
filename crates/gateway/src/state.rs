use std::sync::Arc;

use ck_domain::config::Config;
use ck_providers::DeploymentRegistry;
use ck_store::InMemoryMessageStore;
use ck_tools::ToolRegistry;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<InMemoryMessageStore>,
    pub tools: Arc<ToolRegistry>,
    pub deployments: Arc<DeploymentRegistry>,

    // ── Security ──────────────────────────────────────────────────────
    /// SHA-256 hash of the API bearer token, read once at startup.
    /// `None` means auth is disabled (dev mode).
    pub api_token_hash: Option<Vec<u8>>,
}
