use serde::{Deserialize, Serialize};

use crate::chat::DEFAULT_CHAT_MODEL;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model used when neither the request nor the agent names one.
    #[serde(default = "d_default_model")]
    pub default_model: String,
    /// Streamed text is written back to the store at most this often.
    #[serde(default = "d_flush_interval")]
    pub flush_interval_ms: u64,
    /// Upper bound on generate → tool → generate rounds in one turn.
    #[serde(default = "d_max_tool_steps")]
    pub max_tool_steps: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: d_default_model(),
            flush_interval_ms: d_flush_interval(),
            max_tool_steps: d_max_tool_steps(),
        }
    }
}

fn d_default_model() -> String {
    DEFAULT_CHAT_MODEL.into()
}
fn d_flush_interval() -> u64 {
    500
}
fn d_max_tool_steps() -> usize {
    4
}
