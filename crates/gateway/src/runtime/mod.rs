//! Chat runtime: request normalization, the per-stream orchestrator and the
//! wire mapping the HTTP layer forwards to clients.
//!
//! Entry points: [`start_stream`] and [`start_parallel`] take a normalized
//! chat and return a channel of [`WireEvent`]s suitable for SSE or
//! non-streaming aggregation.

pub mod normalizer;
pub mod orchestrator;
pub mod parallel;
pub mod wire;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use ck_providers::GenerationAdapter;

use crate::state::AppState;

pub use normalizer::{process_chat, process_regeneration, ProcessedChat, ProcessedRegeneration};
pub use orchestrator::{
    OrchestratorSettings, ResponseSlot, StreamJob, StreamOrchestrator, StreamOutcome, StreamState,
};
pub use wire::{WireEvent, WireEventType};

/// Orchestrator wired to the shared store and tool registry.
pub fn orchestrator_for(state: &AppState, adapter: Arc<dyn GenerationAdapter>) -> StreamOrchestrator {
    StreamOrchestrator::new(
        state.store.clone(),
        state.tools.clone(),
        adapter,
        OrchestratorSettings::from_config(&state.config),
    )
}

/// Run `job` on its own task, sending events into `tx`.
pub fn spawn_stream(
    orchestrator: StreamOrchestrator,
    job: StreamJob,
    tx: mpsc::Sender<WireEvent>,
) -> JoinHandle<StreamOutcome> {
    let span = tracing::info_span!(
        "chat_stream",
        conversation_id = job.ctx.conversation_id.as_deref().unwrap_or_default(),
        message_id = %job.message_id(),
        user_id = %job.ctx.user_id,
        variant = ?job.ctx.parallel_variant,
    );
    tokio::spawn(orchestrator.run(job, tx).instrument(span))
}

/// Start a single stream and hand back its event channel.
pub fn start_stream(
    state: &AppState,
    adapter: Arc<dyn GenerationAdapter>,
    job: StreamJob,
) -> (mpsc::Receiver<WireEvent>, JoinHandle<StreamOutcome>) {
    let (tx, rx) = mpsc::channel(state.config.server.stream.channel_capacity);
    let handle = spawn_stream(orchestrator_for(state, adapter), job, tx);
    (rx, handle)
}

/// Start both variants of a parallel pair on one shared channel.
pub fn start_parallel(
    state: &AppState,
    adapter: Arc<dyn GenerationAdapter>,
    pair: parallel::ParallelPair,
) -> (mpsc::Receiver<WireEvent>, [JoinHandle<StreamOutcome>; 2]) {
    let (tx, rx) = mpsc::channel(state.config.server.stream.channel_capacity);
    let [first, second] = pair.into_jobs();
    let handles = [
        spawn_stream(orchestrator_for(state, adapter.clone()), first, tx.clone()),
        spawn_stream(orchestrator_for(state, adapter), second, tx),
    ];
    (rx, handles)
}
