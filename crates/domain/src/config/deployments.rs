use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deployments (model-hosting targets)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeploymentsConfig {
    /// Deployment used when the request carries no `Deployment-Name`
    /// header. Falls back to the first configured deployment.
    #[serde(default)]
    pub default: Option<String>,
    /// Reject requests that omit the `Deployment-Name` header.
    #[serde(default)]
    pub require_header: bool,
    /// Registered deployments (adding a deployment = adding config).
    #[serde(default)]
    pub providers: Vec<DeploymentConfig>,
}

impl DeploymentsConfig {
    /// Name of the deployment selected when no header is sent.
    pub fn default_name(&self) -> Option<&str> {
        self.default
            .as_deref()
            .or_else(|| self.providers.first().map(|p| p.name.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub name: String,
    #[serde(default)]
    pub kind: DeploymentKind,
    #[serde(default = "d_cohere_url")]
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Models this deployment advertises on `/v1/deployments`.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "d_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentKind {
    /// Cohere platform `/v1/chat` streaming API.
    #[default]
    Cohere,
}

/// Where a deployment's API key comes from. `key` wins over `env`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

fn d_cohere_url() -> String {
    "https://api.cohere.com".into()
}

fn d_timeout() -> u64 {
    120
}
