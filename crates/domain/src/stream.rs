use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::pin::Pin;

use crate::tool::{ToolCall, ToolResult};

/// A boxed async stream, used for provider generation streams.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// The event sequence of one generation, as handed to the orchestrator.
pub type GenerationStream = BoxStream<'static, GenerationEvent>;

/// Provider-agnostic events of a single generation.
///
/// Ordering contract: exactly one `StreamStart` precedes every
/// `StreamData`, and exactly one `StreamEnd` or `Error` terminates the
/// sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    StreamStart { generation_id: Option<String> },
    StreamData(StreamData),
    StreamEnd { finish_reason: FinishReason },
    /// Provider-side failure after the stream opened. Terminal.
    Error { message: String },
}

/// Payload of a `StreamData` event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamData {
    TextDelta { text: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    Citations { citations: Vec<Value> },
    /// An event type this version does not model. Forwarded as-is.
    Opaque { event_type: String, payload: Value },
}

impl StreamData {
    /// Wire name used for the `data_type` field of outward events.
    pub fn type_name(&self) -> &str {
        match self {
            StreamData::TextDelta { .. } => "text-generation",
            StreamData::ToolCall(_) => "tool-calls-generation",
            StreamData::ToolResult(_) => "tool-result",
            StreamData::Citations { .. } => "citation-generation",
            StreamData::Opaque { event_type, .. } => event_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Complete,
    MaxTokens,
    /// The step ended so tool outputs can be fed back in.
    ToolCalls,
    Error,
    ErrorLimit,
    ErrorToxic,
    UserCancel,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Complete => "COMPLETE",
            FinishReason::MaxTokens => "MAX_TOKENS",
            FinishReason::ToolCalls => "TOOL_CALLS",
            FinishReason::Error => "ERROR",
            FinishReason::ErrorLimit => "ERROR_LIMIT",
            FinishReason::ErrorToxic => "ERROR_TOXIC",
            FinishReason::UserCancel => "USER_CANCEL",
        }
    }

    /// Map a provider's finish reason string. Unknown values count as errors.
    pub fn from_provider(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "COMPLETE" | "STOP_SEQUENCE" | "END_TURN" => FinishReason::Complete,
            "MAX_TOKENS" => FinishReason::MaxTokens,
            "TOOL_CALL" | "TOOL_CALLS" => FinishReason::ToolCalls,
            "ERROR_LIMIT" => FinishReason::ErrorLimit,
            "ERROR_TOXIC" => FinishReason::ErrorToxic,
            "USER_CANCEL" => FinishReason::UserCancel,
            _ => FinishReason::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            FinishReason::Error | FinishReason::ErrorLimit | FinishReason::ErrorToxic
        )
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
