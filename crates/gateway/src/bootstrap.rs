//! AppState construction and background-task spawning extracted from `main.rs`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};

use ck_domain::config::{Config, ConfigSeverity};
use ck_providers::DeploymentRegistry;
use ck_store::InMemoryMessageStore;
use ck_tools::ToolRegistry;

use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Message store ────────────────────────────────────────────────
    let store = if config.store.persist {
        InMemoryMessageStore::open(&config.store.state_path).with_context(|| {
            format!(
                "opening message store at {}",
                config.store.state_path.display()
            )
        })?
    } else {
        tracing::info!("message persistence disabled, using an ephemeral store");
        InMemoryMessageStore::ephemeral()
    };
    let store = Arc::new(store.with_agents(config.agents.clone()));
    tracing::info!(
        messages = store.message_count(),
        agents = config.agents.len() + 1,
        "message store ready"
    );

    // ── Tools ────────────────────────────────────────────────────────
    let tools = Arc::new(ToolRegistry::builtin(&config.tools));
    tracing::info!(
        tools = tools.len(),
        visible = tools.list_visible().len(),
        "tool registry ready"
    );

    // ── Deployments ──────────────────────────────────────────────────
    let deployments = Arc::new(DeploymentRegistry::from_config(&config.deployments));
    if deployments.is_empty() {
        tracing::warn!("no deployments available, chat endpoints will return 400");
    } else {
        tracing::info!(deployments = deployments.len(), "deployment registry ready");
    }

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = api_token_hash(&config.server.api_token_env);

    Ok(AppState {
        config,
        store,
        tools,
        deployments,
        api_token_hash,
    })
}

fn api_token_hash(env_var: &str) -> Option<Vec<u8>> {
    match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
        Some(token) => {
            tracing::info!(source = %format!("env:{env_var}"), "API bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        None => {
            tracing::warn!(
                env_var = %env_var,
                "no API token configured, /v1 routes are unauthenticated"
            );
            None
        }
    }
}

/// Spawn the long-running background tokio tasks (periodic store flush).
///
/// Call this **after** [`build_app_state`] when running the HTTP server.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Periodic message store flush ─────────────────────────────────
    if state.config.store.persist {
        let store = state.store.clone();
        let every = Duration::from_secs(state.config.store.flush_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = store.flush_if_dirty().await {
                    tracing::warn!(error = %e, "message store flush failed");
                }
            }
        });
    }
}
