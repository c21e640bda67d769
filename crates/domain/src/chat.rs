//! Inbound chat request shape and its range validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::message::ChatTurn;
use crate::tool::ToolResult;

/// Model used when neither the request nor its agent names one.
pub const DEFAULT_CHAT_MODEL: &str = "c4ai-aya-expanse-32b";

pub const MAX_TOP_K: u32 = 500;
pub const MAX_TOP_P: f64 = 0.99;
pub const MAX_STOP_SEQUENCES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptTruncation {
    Off,
    #[default]
    AutoPreserveOrder,
}

/// A tool the client asks to enable, by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedTool {
    pub name: String,
}

/// A chat request as accepted by every chat endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub k: Option<u32>,
    #[serde(default)]
    pub p: Option<f64>,
    #[serde(default)]
    pub preamble: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    #[serde(default)]
    pub prompt_truncation: PromptTruncation,
    /// Outputs of tools called in a previous step.
    #[serde(default)]
    pub tool_results: Option<Vec<ToolResult>>,
    /// Grounding documents; each one a free-form key-value record.
    #[serde(default)]
    pub documents: Vec<Value>,
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub force_single_step: bool,
    #[serde(default)]
    pub search_queries_only: bool,
    #[serde(default)]
    pub tools: Option<Vec<RequestedTool>>,
    /// Client-managed history. When present nothing is persisted.
    #[serde(default)]
    pub chat_history: Option<Vec<ChatTurn>>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Check every range constraint and report all violations at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if let Some(t) = self.temperature {
            if !(t >= 0.0 && t.is_finite()) {
                problems.push(format!("temperature must be >= 0, got {t}"));
            }
        }
        if let Some(k) = self.k {
            if k > MAX_TOP_K {
                problems.push(format!("k must be within [0, {MAX_TOP_K}], got {k}"));
            }
        }
        if let Some(p) = self.p {
            if !(0.0..=MAX_TOP_P).contains(&p) {
                problems.push(format!("p must be within [0, {MAX_TOP_P}], got {p}"));
            }
        }
        if self.max_tokens == Some(0) {
            problems.push("max_tokens must be >= 1".into());
        }
        if let Some(stops) = &self.stop_sequences {
            if stops.len() > MAX_STOP_SEQUENCES {
                problems.push(format!(
                    "at most {MAX_STOP_SEQUENCES} stop_sequences allowed, got {}",
                    stops.len()
                ));
            }
        }
        for (field, value) in [
            ("presence_penalty", self.presence_penalty),
            ("frequency_penalty", self.frequency_penalty),
        ] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    problems.push(format!("{field} must be within [0, 1], got {v}"));
                }
            }
        }
        for (i, doc) in self.documents.iter().enumerate() {
            if !doc.is_object() {
                problems.push(format!("documents[{i}] must be an object"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(problems))
        }
    }

    /// Names of the tools the client asked for, if it asked at all.
    pub fn requested_tool_names(&self) -> Option<Vec<String>> {
        self.tools
            .as_ref()
            .map(|tools| tools.iter().map(|t| t.name.clone()).collect())
    }
}
