//! Tool dispatch layer.
//!
//! Tools are a closed set of built-ins behind the [`Tool`] trait, registered
//! once at startup in a [`ToolRegistry`]. The registry resolves which tools a
//! request may use and invokes them, turning every failure into a structured
//! error fragment so one broken tool never aborts a turn.

pub mod calculator;
pub mod meeting_setup;

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::Value;

use ck_domain::config::ToolsConfig;
use ck_domain::context::Context;
use ck_domain::tool::{tool_error_fragment, ToolCall, ToolDefinition};
use ck_domain::trace::{duration_ms, TraceEvent};

pub use calculator::Calculator;
pub use meeting_setup::MeetingSetup;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("{0}")]
    Execution(String),

    #[error("tool call timed out after {0}s")]
    Timeout(u64),

    #[error("tool panicked: {0}")]
    Panicked(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> &str;

    /// Current descriptor. `is_available` is computed on every call.
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. Each returned value is one result fragment, commonly
    /// `{"text": ...}`.
    async fn call(&self, parameters: &Value, ctx: &Context) -> Result<Vec<Value>, ToolError>;
}

/// Result of [`ToolRegistry::dispatch`]. Failures are already folded into
/// `outputs` as an error fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub outputs: Vec<Value>,
    pub is_error: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    call_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            call_timeout,
        }
    }

    /// All built-in tools, with availability driven by `config`.
    pub fn builtin(config: &ToolsConfig) -> Self {
        Self::new(Duration::from_secs(config.call_timeout_secs))
            .register(Arc::new(Calculator::new(config.calculator.enabled)))
            .register(Arc::new(MeetingSetup::new(config.meeting_setup.enabled)))
    }

    /// Register a tool. Returns self for chaining.
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.id().to_owned(), tool);
        self
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(id)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of every visible tool (sorted by name), available or not.
    pub fn list_visible(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| t.definition())
            .filter(|d| d.is_visible)
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Resolve requested tool ids into the definitions the model will see.
    ///
    /// Unknown, unavailable and invisible tools are dropped, as are tools
    /// whose required parameters the model cannot fill. Order follows the
    /// request; duplicates are collapsed.
    pub fn resolve(&self, requested: &[String]) -> Vec<ToolDefinition> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        for id in requested {
            if !seen.insert(id.as_str()) {
                continue;
            }
            let Some(tool) = self.tools.get(id) else {
                tracing::debug!(tool_name = %id, "requested tool is not registered, skipping");
                continue;
            };
            let def = tool.definition();
            if !def.is_available {
                tracing::warn!(
                    tool_name = %id,
                    reason = def.error_message.as_deref().unwrap_or("unavailable"),
                    "tool unavailable, skipping"
                );
                continue;
            }
            if !def.is_visible {
                tracing::debug!(tool_name = %id, "tool is not visible, skipping");
                continue;
            }
            let unfillable: Vec<&str> = def
                .parameter_definitions
                .iter()
                .filter(|(_, p)| p.required && !p.is_model_fillable())
                .map(|(name, _)| name.as_str())
                .collect();
            if !unfillable.is_empty() {
                tracing::warn!(
                    tool_name = %id,
                    parameters = ?unfillable,
                    "required parameters cannot be supplied by the model, skipping"
                );
                continue;
            }
            resolved.push(def);
        }

        resolved
    }

    /// Invoke a tool call. Never fails: any error, timeout or panic comes
    /// back as `[{"status": "error", "details": ...}]`.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &Context) -> ToolOutcome {
        let started = Instant::now();
        let outcome = match self.try_dispatch(call, ctx).await {
            Ok(outputs) => ToolOutcome {
                outputs,
                is_error: false,
            },
            Err(e) => {
                tracing::warn!(tool_name = %call.name, error = %e, "tool call failed");
                ToolOutcome {
                    outputs: tool_error_fragment(e.to_string()),
                    is_error: true,
                }
            }
        };

        TraceEvent::ToolDispatched {
            tool_name: call.name.clone(),
            is_error: outcome.is_error,
            duration_ms: duration_ms(started.elapsed()),
        }
        .emit();

        outcome
    }

    async fn try_dispatch(&self, call: &ToolCall, ctx: &Context) -> Result<Vec<Value>, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::Unknown(call.name.clone()))?;

        let def = tool.definition();
        if !def.is_available {
            return Err(ToolError::Unavailable(
                def.error_message
                    .unwrap_or_else(|| format!("{} is not available", def.display_name)),
            ));
        }
        for name in def.required_parameters() {
            if call.parameters.get(name).map_or(true, Value::is_null) {
                return Err(ToolError::MissingParameter(name.to_owned()));
            }
        }

        let invocation = AssertUnwindSafe(tool.call(&call.parameters, ctx)).catch_unwind();
        match tokio::time::timeout(self.call_timeout, invocation).await {
            Err(_) => Err(ToolError::Timeout(self.call_timeout.as_secs())),
            Ok(Err(panic)) => Err(ToolError::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(result)) => result,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Standard message for a tool that is switched off.
pub(crate) fn unavailable_message(display_name: &str) -> String {
    format!("{display_name} is not available. Enable it under [tools] in the configuration.")
}
