//! Test doubles shared by the gateway integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use ck_domain::agent::{Agent, AgentToolMetadata};
use ck_domain::chat::ChatRequest;
use ck_domain::context::Context;
use ck_domain::error::{Error, Result};
use ck_domain::message::{Message, MessageDraft};
use ck_domain::stream::{FinishReason, GenerationEvent, GenerationStream, StreamData};
use ck_domain::tool::{ToolCall, ToolDefinition};
use ck_gateway::runtime::{OrchestratorSettings, StreamJob, StreamOrchestrator, StreamOutcome, WireEvent};
use ck_providers::GenerationAdapter;
use ck_store::{InMemoryMessageStore, MessageStore, StoreError, StoreResult};
use ck_tools::ToolRegistry;

// ── Scripted adapter ────────────────────────────────────────────────

/// One `generate` call's behaviour.
pub enum Script {
    /// Yield these events, then end.
    Events(Vec<GenerationEvent>),
    /// Yield these events, then never produce another one.
    Hang(Vec<GenerationEvent>),
    /// Fail to open.
    Fail(String),
}

/// Adapter that replays scripted generations and records every request.
pub struct ScriptedAdapter {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    models: Vec<String>,
}

impl ScriptedAdapter {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            models: vec!["command-r".into()],
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationAdapter for ScriptedAdapter {
    async fn generate(
        &self,
        request: &ChatRequest,
        _tools: &[ToolDefinition],
        _ctx: &Context,
    ) -> Result<GenerationStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Events(events)) => Ok(Box::pin(stream::iter(events))),
            Some(Script::Hang(events)) => {
                Ok(Box::pin(stream::iter(events).chain(stream::pending())))
            }
            Some(Script::Fail(message)) => Err(Error::Provider {
                provider: "scripted".into(),
                message,
            }),
            None => Err(Error::Other("no script left".into())),
        }
    }

    fn deployment(&self) -> &str {
        "scripted"
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    fn default_model(&self) -> &str {
        &self.models[0]
    }
}

// ── Event builders ──────────────────────────────────────────────────

pub fn start(generation_id: &str) -> GenerationEvent {
    GenerationEvent::StreamStart {
        generation_id: Some(generation_id.into()),
    }
}

pub fn delta(text: &str) -> GenerationEvent {
    GenerationEvent::StreamData(StreamData::TextDelta { text: text.into() })
}

pub fn tool_call(name: &str, parameters: serde_json::Value) -> GenerationEvent {
    GenerationEvent::StreamData(StreamData::ToolCall(ToolCall {
        name: name.into(),
        parameters,
    }))
}

pub fn end(finish_reason: FinishReason) -> GenerationEvent {
    GenerationEvent::StreamEnd { finish_reason }
}

pub fn hello_world() -> Vec<GenerationEvent> {
    vec![
        start("gen-1"),
        delta("Hello"),
        delta(", "),
        delta("world"),
        end(FinishReason::Complete),
    ]
}

// ── Flaky store ─────────────────────────────────────────────────────

/// Delegates to an in-memory store but fails text updates on demand.
pub struct FlakyStore {
    pub inner: InMemoryMessageStore,
    transient_failures: AtomicUsize,
    permanent: bool,
    mark_inactive_failures: AtomicUsize,
}

impl FlakyStore {
    /// Fail the next `n` text updates with a transient error.
    pub fn transient(n: usize) -> Self {
        Self {
            inner: InMemoryMessageStore::ephemeral(),
            transient_failures: AtomicUsize::new(n),
            permanent: false,
            mark_inactive_failures: AtomicUsize::new(0),
        }
    }

    /// Fail every text update permanently.
    pub fn broken() -> Self {
        Self {
            inner: InMemoryMessageStore::ephemeral(),
            transient_failures: AtomicUsize::new(0),
            permanent: true,
            mark_inactive_failures: AtomicUsize::new(0),
        }
    }

    /// Fail the next `mark_inactive` call; everything else works.
    pub fn refusing_next_supersede() -> Self {
        Self {
            inner: InMemoryMessageStore::ephemeral(),
            transient_failures: AtomicUsize::new(0),
            permanent: false,
            mark_inactive_failures: AtomicUsize::new(1),
        }
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn create_message(&self, draft: MessageDraft) -> StoreResult<Message> {
        self.inner.create_message(draft).await
    }

    async fn update_message_text(&self, id: &str, text: &str) -> StoreResult<()> {
        if self.permanent {
            return Err(StoreError::Conflict(id.into()));
        }
        let left = self.transient_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.transient_failures.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Transient("lock timeout".into()));
        }
        self.inner.update_message_text(id, text).await
    }

    async fn set_generation_id(&self, id: &str, generation_id: &str) -> StoreResult<()> {
        self.inner.set_generation_id(id, generation_id).await
    }

    async fn mark_active(&self, id: &str) -> StoreResult<()> {
        self.inner.mark_active(id).await
    }

    async fn mark_inactive(&self, ids: &[String]) -> StoreResult<()> {
        if self.mark_inactive_failures.load(Ordering::SeqCst) > 0 {
            self.mark_inactive_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Conflict("mark_inactive".into()));
        }
        self.inner.mark_inactive(ids).await
    }

    async fn get_message(&self, id: &str) -> StoreResult<Option<Message>> {
        self.inner.get_message(id).await
    }

    async fn get_max_position(&self, conversation_id: &str) -> StoreResult<Option<i64>> {
        self.inner.get_max_position(conversation_id).await
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        active_only: bool,
    ) -> StoreResult<Vec<Message>> {
        self.inner.list_messages(conversation_id, active_only).await
    }

    async fn get_agent(&self, agent_id: &str) -> StoreResult<Option<Agent>> {
        self.inner.get_agent(agent_id).await
    }

    async fn get_tool_metadata(&self, agent_id: &str) -> StoreResult<Vec<AgentToolMetadata>> {
        self.inner.get_tool_metadata(agent_id).await
    }
}

// ── Runner ──────────────────────────────────────────────────────────

pub fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        flush_interval: Duration::ZERO,
        max_tool_steps: 4,
        send_timeout: Duration::from_secs(5),
    }
}

pub fn tools() -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::builtin(&Default::default()))
}

/// Run `job` to completion, collecting every wire event.
pub async fn run_job(
    store: Arc<dyn MessageStore>,
    adapter: Arc<dyn GenerationAdapter>,
    job: StreamJob,
) -> (Vec<WireEvent>, StreamOutcome) {
    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator = StreamOrchestrator::new(store, tools(), adapter, settings());
    let handle = tokio::spawn(orchestrator.run(job, tx));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (events, handle.await.unwrap())
}
