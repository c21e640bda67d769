use serde::Serialize;

use ck_domain::chat::ChatRequest;
use ck_domain::context::Context;
use ck_domain::error::Result;
use ck_domain::stream::GenerationStream;
use ck_domain::tool::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core adapter trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every model deployment adapter implements.
///
/// Implementations translate a normalized [`ChatRequest`] into the
/// deployment's wire format and its streamed response back into
/// [`GenerationEvent`](ck_domain::stream::GenerationEvent)s.
#[async_trait::async_trait]
pub trait GenerationAdapter: Send + Sync {
    /// Open a generation stream.
    ///
    /// An `Err` means the stream never opened (connection refused, bad
    /// status). Failures after that arrive in-band as a terminal
    /// `GenerationEvent::Error`.
    async fn generate(
        &self,
        request: &ChatRequest,
        tools: &[ToolDefinition],
        ctx: &Context,
    ) -> Result<GenerationStream>;

    /// Deployment name this adapter was registered under.
    fn deployment(&self) -> &str;

    /// Models the deployment advertises.
    fn models(&self) -> &[String];

    /// Model used when the request names none.
    fn default_model(&self) -> &str;
}

/// Listing entry for `GET /v1/deployments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentInfo {
    pub name: String,
    pub models: Vec<String>,
    pub is_available: bool,
    pub is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
