//! Stream orchestrator: consumes one generation (plus its tool-continuation
//! steps), keeps the response row in sync and forwards wire events to the
//! client channel.
//!
//! States run `IDLE → STARTED → STREAMING → {COMPLETED | FAILED}`. The pure
//! [`transition`] function decides the next state; [`StreamOrchestrator::run`]
//! performs the side effects.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use ck_domain::chat::ChatRequest;
use ck_domain::config::Config;
use ck_domain::context::Context;
use ck_domain::message::{ChatTurn, Message, MessageDraft, MessageRole};
use ck_domain::stream::{FinishReason, GenerationEvent, GenerationStream, StreamData};
use ck_domain::tool::{ToolCall, ToolDefinition, ToolResult};
use ck_domain::trace::{duration_ms, TraceEvent};
use ck_providers::GenerationAdapter;
use ck_store::{MessageStore, StoreResult};
use ck_tools::ToolRegistry;

use super::normalizer::ProcessedChat;
use super::wire::{to_wire_event, WireEvent, WireMeta};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Started,
    Streaming,
    Completed,
    Failed,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Completed | StreamState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Idle => "IDLE",
            StreamState::Started => "STARTED",
            StreamState::Streaming => "STREAMING",
            StreamState::Completed => "COMPLETED",
            StreamState::Failed => "FAILED",
        }
    }
}

/// Next state for `event`. Terminal states absorb everything. Data before
/// the start, or a second start, is a protocol violation and fails the
/// stream.
pub fn transition(state: StreamState, event: &GenerationEvent) -> StreamState {
    use StreamState::*;

    match (state, event) {
        (Completed | Failed, _) => state,
        (Idle, GenerationEvent::StreamStart { .. }) => Started,
        (Idle, _) => Failed,
        (Started | Streaming, GenerationEvent::StreamStart { .. }) => Failed,
        (Started | Streaming, GenerationEvent::StreamData(_)) => Streaming,
        (Started | Streaming, GenerationEvent::StreamEnd { finish_reason }) => {
            if finish_reason.is_error() {
                Failed
            } else {
                Completed
            }
        }
        (Started | Streaming, GenerationEvent::Error { .. }) => Failed,
    }
}

fn is_protocol_violation(from: StreamState, event: &GenerationEvent) -> bool {
    transition(from, event) == StreamState::Failed
        && !from.is_terminal()
        && !matches!(
            event,
            GenerationEvent::Error { .. } | GenerationEvent::StreamEnd { .. }
        )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job / outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub flush_interval: Duration,
    pub max_tool_steps: usize,
    pub send_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            flush_interval: Duration::from_millis(config.chat.flush_interval_ms),
            max_tool_steps: config.chat.max_tool_steps,
            send_timeout: Duration::from_secs(config.server.stream.send_timeout_secs),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// The row a stream writes into.
#[derive(Debug, Clone)]
pub enum ResponseSlot {
    /// Created by the normalizer before streaming.
    Existing(Message),
    /// Created on the stream's own `StreamStart` (parallel variant 2). The
    /// draft always carries a pre-assigned id.
    Lazy(MessageDraft),
}

impl ResponseSlot {
    pub fn lazy(mut draft: MessageDraft) -> Self {
        if draft.id.is_none() {
            draft.id = Some(uuid::Uuid::new_v4().to_string());
        }
        ResponseSlot::Lazy(draft)
    }

    pub fn message_id(&self) -> &str {
        match self {
            ResponseSlot::Existing(m) => &m.id,
            ResponseSlot::Lazy(d) => d.id.as_deref().unwrap_or_default(),
        }
    }

    fn parallel(&self) -> (Option<String>, Option<u8>) {
        match self {
            ResponseSlot::Existing(m) => (m.parallel_group_id.clone(), m.parallel_variant),
            ResponseSlot::Lazy(d) => (d.parallel_group_id.clone(), d.parallel_variant),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamJob {
    pub request: ChatRequest,
    pub tools: Vec<ToolDefinition>,
    pub ctx: Context,
    pub slot: ResponseSlot,
    pub should_store: bool,
    /// Attached to the first event only (regeneration).
    pub previous_response_message_ids: Option<Vec<String>>,
}

impl StreamJob {
    pub fn from_processed(processed: ProcessedChat) -> Self {
        Self {
            request: processed.request,
            tools: processed.managed_tools,
            ctx: processed.ctx,
            slot: ResponseSlot::Existing(processed.response_message),
            should_store: processed.should_store,
            previous_response_message_ids: None,
        }
    }

    pub fn with_previous_ids(mut self, ids: Vec<String>) -> Self {
        self.previous_response_message_ids = Some(ids);
        self
    }

    pub fn message_id(&self) -> &str {
        self.slot.message_id()
    }
}

/// Final result of one orchestrated stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub state: StreamState,
    pub message_id: String,
    pub conversation_id: Option<String>,
    pub generation_id: Option<String>,
    pub text: String,
    pub citations: Vec<Value>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub error: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct StreamOrchestrator {
    store: Arc<dyn MessageStore>,
    tools: Arc<ToolRegistry>,
    adapter: Arc<dyn GenerationAdapter>,
    settings: OrchestratorSettings,
}

/// Mutable bookkeeping for one run.
struct Turn {
    state: StreamState,
    meta: WireMeta,
    text: String,
    step_text_start: usize,
    citations: Vec<Value>,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    error: Option<String>,
    row_exists: bool,
    cancelled: bool,
    previous_ids: Option<Vec<String>>,
    last_flush: Instant,
}

impl StreamOrchestrator {
    pub fn new(
        store: Arc<dyn MessageStore>,
        tools: Arc<ToolRegistry>,
        adapter: Arc<dyn GenerationAdapter>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            tools,
            adapter,
            settings,
        }
    }

    /// Drive the job to a terminal state. Never fails: every problem ends
    /// up in the returned outcome and, when the client is still there, in a
    /// terminal `stream-end` event.
    pub async fn run(self, job: StreamJob, tx: mpsc::Sender<WireEvent>) -> StreamOutcome {
        let started = Instant::now();
        let (parallel_group_id, parallel_variant) = job.slot.parallel();
        let message_id = job.message_id().to_owned();

        let mut turn = Turn {
            state: StreamState::Idle,
            meta: WireMeta {
                response_id: message_id.clone(),
                conversation_id: job.ctx.conversation_id.clone(),
                generation_id: None,
                parallel_group_id,
                parallel_variant,
            },
            text: String::new(),
            step_text_start: 0,
            citations: Vec::new(),
            tool_calls: Vec::new(),
            finish_reason: None,
            error: None,
            row_exists: job.should_store && matches!(job.slot, ResponseSlot::Existing(_)),
            cancelled: false,
            previous_ids: job.previous_response_message_ids.clone(),
            last_flush: Instant::now(),
        };

        let mut request = job.request.clone();
        let mut step = 0usize;
        let mut pending: Vec<ToolResult> = Vec::new();
        let mut stream = self.open(&request, &job, step, &tx, &mut turn).await;

        while let Some(active) = stream.as_mut() {
            let next = tokio::select! {
                biased;
                _ = tx.closed() => {
                    turn.cancelled = true;
                    break;
                }
                ev = active.next() => ev,
            };
            let event = next.unwrap_or(GenerationEvent::StreamEnd {
                finish_reason: FinishReason::Error,
            });

            // Continuation steps extend the same generation.
            if step > 0 && matches!(event, GenerationEvent::StreamStart { .. }) {
                continue;
            }

            if let GenerationEvent::StreamEnd {
                finish_reason: FinishReason::ToolCalls,
            } = event
            {
                if !pending.is_empty() && step < self.settings.max_tool_steps {
                    step += 1;
                    request = continuation_request(
                        &request,
                        &turn.text[turn.step_text_start..],
                        std::mem::take(&mut pending),
                    );
                    turn.step_text_start = turn.text.len();
                    stream = self.open(&request, &job, step, &tx, &mut turn).await;
                    continue;
                }
            }

            if is_protocol_violation(turn.state, &event) {
                tracing::warn!(
                    state = turn.state.as_str(),
                    event = ?event,
                    "generation protocol violation"
                );
                turn.error = Some(format!(
                    "protocol violation: unexpected event in state {}",
                    turn.state.as_str()
                ));
                turn.state = StreamState::Failed;
                break;
            }
            turn.state = transition(turn.state, &event);

            self.apply(event, &job, &tx, &mut turn, &mut pending).await;

            if turn.state.is_terminal() || turn.cancelled {
                break;
            }
        }

        self.finish(job, tx, turn, stream, started).await
    }

    /// Open a generation step. On failure the turn is marked failed and
    /// `None` is returned.
    async fn open(
        &self,
        request: &ChatRequest,
        job: &StreamJob,
        step: usize,
        tx: &mpsc::Sender<WireEvent>,
        turn: &mut Turn,
    ) -> Option<GenerationStream> {
        let opened = Instant::now();
        let result = tokio::select! {
            biased;
            _ = tx.closed() => {
                turn.cancelled = true;
                return None;
            }
            r = self.adapter.generate(request, &job.tools, &job.ctx) => r,
        };

        TraceEvent::GenerationOpened {
            deployment: self.adapter.deployment().to_owned(),
            model: request.model.clone().unwrap_or_default(),
            step,
            duration_ms: duration_ms(opened.elapsed()),
        }
        .emit();

        match result {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::warn!(step, error = %e, "failed to open generation stream");
                turn.error = Some(e.to_string());
                turn.state = StreamState::Failed;
                None
            }
        }
    }

    /// Side effects of an accepted event.
    async fn apply(
        &self,
        event: GenerationEvent,
        job: &StreamJob,
        tx: &mpsc::Sender<WireEvent>,
        turn: &mut Turn,
        pending: &mut Vec<ToolResult>,
    ) {
        let message_id = job.message_id();

        match &event {
            GenerationEvent::StreamStart { generation_id } => {
                turn.meta.generation_id = generation_id.clone();

                if let (true, ResponseSlot::Lazy(draft)) = (job.should_store, &job.slot) {
                    turn.row_exists = retry_once("create_message", message_id, || {
                        self.store.create_message(draft.clone())
                    })
                    .await
                    .is_some();
                }
                if let (true, Some(gid)) = (turn.row_exists, generation_id) {
                    retry_once("set_generation_id", message_id, || {
                        self.store.set_generation_id(message_id, gid)
                    })
                    .await;
                }
                let wire = to_wire_event(&event, &turn.meta);
                self.emit(tx, turn, wire).await;
            }
            GenerationEvent::StreamData(StreamData::TextDelta { text }) => {
                turn.text.push_str(text);
                let wire = to_wire_event(&event, &turn.meta);
                self.emit(tx, turn, wire).await;
                self.maybe_flush(message_id, turn).await;
            }
            GenerationEvent::StreamData(StreamData::ToolCall(call)) => {
                turn.tool_calls.push(call.clone());
                let wire = to_wire_event(&event, &turn.meta);
                self.emit(tx, turn, wire).await;

                let outcome = self.tools.dispatch(call, &job.ctx).await;
                let result = ToolResult {
                    call: call.clone(),
                    outputs: outcome.outputs,
                };
                let wire = to_wire_event(
                    &GenerationEvent::StreamData(StreamData::ToolResult(result.clone())),
                    &turn.meta,
                );
                pending.push(result);
                self.emit(tx, turn, wire).await;
            }
            GenerationEvent::StreamData(StreamData::Citations { citations }) => {
                turn.citations.extend(citations.iter().cloned());
                let wire = to_wire_event(&event, &turn.meta);
                self.emit(tx, turn, wire).await;
            }
            GenerationEvent::StreamData(_) => {
                let wire = to_wire_event(&event, &turn.meta);
                self.emit(tx, turn, wire).await;
            }
            GenerationEvent::StreamEnd { finish_reason } => {
                turn.finish_reason = Some(*finish_reason);
            }
            GenerationEvent::Error { message } => {
                tracing::warn!(error = %message, "generation failed mid-stream");
                turn.error = Some(message.clone());
            }
        }
    }

    /// Send one event. A closed channel or a send that outlives the send
    /// timeout marks the turn cancelled.
    async fn emit(&self, tx: &mpsc::Sender<WireEvent>, turn: &mut Turn, mut wire: WireEvent) {
        if turn.cancelled {
            return;
        }
        if let Some(ids) = turn.previous_ids.take() {
            wire.previous_response_message_ids = Some(ids);
        }
        match tokio::time::timeout(self.settings.send_timeout, tx.send(wire)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                tracing::debug!("client disconnected");
                turn.cancelled = true;
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.settings.send_timeout.as_secs(),
                    "event send timed out, treating client as gone"
                );
                turn.cancelled = true;
            }
        }
    }

    async fn maybe_flush(&self, message_id: &str, turn: &mut Turn) {
        if !turn.row_exists || turn.last_flush.elapsed() < self.settings.flush_interval {
            return;
        }
        turn.last_flush = Instant::now();
        let text = turn.text.as_str();
        retry_once("update_message_text", message_id, || {
            self.store.update_message_text(message_id, text)
        })
        .await;
    }

    async fn finish(
        &self,
        job: StreamJob,
        tx: mpsc::Sender<WireEvent>,
        mut turn: Turn,
        stream: Option<GenerationStream>,
        started: Instant,
    ) -> StreamOutcome {
        let message_id = job.message_id();

        if turn.cancelled || !turn.state.is_terminal() {
            turn.state = StreamState::Failed;
        }

        let finish_reason = match turn.state {
            _ if turn.cancelled => FinishReason::UserCancel,
            StreamState::Completed => turn.finish_reason.unwrap_or(FinishReason::Complete),
            _ => turn
                .finish_reason
                .filter(FinishReason::is_error)
                .unwrap_or(FinishReason::Error),
        };

        // Persist before letting go of the adapter stream.
        if turn.row_exists {
            let text = turn.text.as_str();
            retry_once("update_message_text", message_id, || {
                self.store.update_message_text(message_id, text)
            })
            .await;
            if turn.state == StreamState::Completed {
                retry_once("mark_active", message_id, || self.store.mark_active(message_id)).await;
            }
        }
        drop(stream);

        let end = WireEvent::end(&turn.meta, finish_reason, turn.error.clone());
        self.emit(&tx, &mut turn, end).await;

        TraceEvent::StreamFinished {
            conversation_id: turn.meta.conversation_id.clone().unwrap_or_default(),
            message_id: message_id.to_owned(),
            final_state: turn.state.as_str().to_owned(),
            finish_reason: finish_reason.as_str().to_owned(),
            text_chars: turn.text.chars().count(),
            parallel_variant: turn.meta.parallel_variant,
            duration_ms: duration_ms(started.elapsed()),
        }
        .emit();

        StreamOutcome {
            state: turn.state,
            message_id: message_id.to_owned(),
            conversation_id: turn.meta.conversation_id,
            generation_id: turn.meta.generation_id,
            text: turn.text,
            citations: turn.citations,
            tool_calls: turn.tool_calls,
            finish_reason,
            error: turn.error,
        }
    }
}

/// Request for the step after tool calls: the previous prompt and the
/// step's text move into history, and the tool outputs ride along.
fn continuation_request(prev: &ChatRequest, step_text: &str, results: Vec<ToolResult>) -> ChatRequest {
    let mut next = prev.clone();
    let mut history = next.chat_history.take().unwrap_or_default();
    if !prev.message.is_empty() {
        history.push(ChatTurn {
            role: MessageRole::User,
            message: prev.message.clone(),
        });
    }
    if !step_text.is_empty() {
        history.push(ChatTurn {
            role: MessageRole::Chatbot,
            message: step_text.to_owned(),
        });
    }
    next.chat_history = Some(history);
    next.message = String::new();
    next.tool_results = Some(results);
    next
}

/// Run a store write, retrying once on a transient failure. Failures are
/// logged for reconciliation and reported as `None`; the stream goes on.
async fn retry_once<T, F, Fut>(operation: &'static str, message_id: &str, mut write: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let first = match write().await {
        Ok(v) => return Some(v),
        Err(e) => e,
    };

    let err = if first.is_transient() {
        tracing::warn!(operation, message_id, error = %first, "transient store failure, retrying once");
        match write().await {
            Ok(v) => return Some(v),
            Err(e) => e,
        }
    } else {
        first
    };

    tracing::error!(operation, message_id, error = %err, "store write failed, row needs reconciliation");
    TraceEvent::PersistenceFailed {
        operation: operation.to_owned(),
        message_id: message_id.to_owned(),
        error: err.to_string(),
    }
    .emit();
    None
}
