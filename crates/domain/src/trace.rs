use std::time::Duration;

use serde::Serialize;

/// Structured trace events emitted across all chatkit crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ChatNormalized {
        conversation_id: String,
        model: String,
        agent_id: Option<String>,
        should_store: bool,
        next_position: i64,
        tools: usize,
    },
    MessagesSuperseded {
        conversation_id: String,
        position: i64,
        superseded: usize,
    },
    GenerationOpened {
        deployment: String,
        model: String,
        step: usize,
        duration_ms: u64,
    },
    ToolDispatched {
        tool_name: String,
        is_error: bool,
        duration_ms: u64,
    },
    PersistenceFailed {
        operation: String,
        message_id: String,
        error: String,
    },
    StreamFinished {
        conversation_id: String,
        message_id: String,
        final_state: String,
        finish_reason: String,
        text_chars: usize,
        parallel_variant: Option<u8>,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ck_event");
    }
}

/// Milliseconds in `elapsed`, saturating at `u64::MAX`.
pub fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
