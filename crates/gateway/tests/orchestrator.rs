//! End-to-end runs of the stream orchestrator against scripted generations.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use ck_domain::chat::{ChatRequest, DEFAULT_CHAT_MODEL};
use ck_domain::config::ChatConfig;
use ck_domain::context::Context;
use ck_domain::message::{MessageDraft, MessageRole};
use ck_domain::stream::FinishReason;
use ck_gateway::runtime::parallel::ParallelPair;
use ck_gateway::runtime::{
    process_chat, process_regeneration, StreamJob, StreamOrchestrator, StreamState,
    WireEventType,
};
use ck_store::{InMemoryMessageStore, MessageStore};

use common::*;

async fn new_turn(store: &InMemoryMessageStore, message: &str, conversation: Option<&str>) -> StreamJob {
    let mut request = ChatRequest::new(message);
    request.conversation_id = conversation.map(String::from);
    let processed = process_chat(
        store,
        &tools(),
        &ChatConfig::default(),
        request,
        Context::new().with_user("u1"),
    )
    .await
    .unwrap();
    StreamJob::from_processed(processed)
}

#[tokio::test]
async fn completed_stream_persists_text_and_generation_id() {
    let store = Arc::new(InMemoryMessageStore::ephemeral());
    let job = new_turn(&store, "hi", None).await;
    let message_id = job.message_id().to_owned();

    let adapter = ScriptedAdapter::new(vec![Script::Events(hello_world())]);
    let (events, outcome) = run_job(store.clone(), adapter, job).await;

    let kinds: Vec<WireEventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            WireEventType::StreamStart,
            WireEventType::StreamData,
            WireEventType::StreamData,
            WireEventType::StreamData,
            WireEventType::StreamEnd,
        ]
    );
    assert!(events.iter().all(|e| e.response_id == message_id));
    assert_eq!(events[4].finish_reason, Some(FinishReason::Complete));

    assert_eq!(outcome.state, StreamState::Completed);
    assert_eq!(outcome.text, "Hello, world");

    let row = store.get_message(&message_id).await.unwrap().unwrap();
    assert_eq!(row.text, "Hello, world");
    assert_eq!(row.generation_id.as_deref(), Some("gen-1"));
    assert!(row.is_active);
}

#[tokio::test]
async fn default_model_is_used_when_none_is_given() {
    let store = Arc::new(InMemoryMessageStore::ephemeral());
    let job = new_turn(&store, "hi", None).await;

    let adapter = ScriptedAdapter::new(vec![Script::Events(hello_world())]);
    run_job(store, adapter.clone(), job).await;

    let requests = adapter.requests();
    assert_eq!(requests[0].model.as_deref(), Some(DEFAULT_CHAT_MODEL));
}

#[tokio::test]
async fn replaying_the_same_events_yields_identical_text() {
    let mut texts = Vec::new();
    for _ in 0..2 {
        let store = Arc::new(InMemoryMessageStore::ephemeral());
        let job = new_turn(&store, "hi", None).await;
        let id = job.message_id().to_owned();
        run_job(
            store.clone(),
            ScriptedAdapter::new(vec![Script::Events(hello_world())]),
            job,
        )
        .await;
        texts.push(store.get_message(&id).await.unwrap().unwrap().text);
    }
    assert_eq!(texts[0], texts[1]);
}

#[tokio::test]
async fn failing_tool_yields_error_fragment_and_stream_continues() {
    let store = Arc::new(InMemoryMessageStore::ephemeral());
    let job = new_turn(&store, "what is 1/0?", None).await;

    let adapter = ScriptedAdapter::new(vec![
        Script::Events(vec![
            start("gen-1"),
            tool_call("toolkit_calculator", serde_json::json!({"code": "1/0"})),
            end(FinishReason::ToolCalls),
        ]),
        Script::Events(vec![
            start("gen-1b"),
            delta("That is undefined."),
            end(FinishReason::Complete),
        ]),
    ]);
    let (events, outcome) = run_job(store, adapter.clone(), job).await;

    let data_types: Vec<Option<&str>> = events.iter().map(|e| e.data_type.as_deref()).collect();
    assert_eq!(
        data_types,
        vec![
            None,
            Some("tool-calls-generation"),
            Some("tool-result"),
            Some("text-generation"),
            None,
        ]
    );

    let result = &events[2].tool_results.as_ref().unwrap()[0];
    assert_eq!(result.outputs[0]["status"], "error");
    assert!(result.outputs[0]["details"]
        .as_str()
        .unwrap()
        .contains("division by zero"));

    assert_eq!(outcome.state, StreamState::Completed);
    assert_eq!(outcome.text, "That is undefined.");
    // The continuation's own start does not reset the generation id.
    assert_eq!(outcome.generation_id.as_deref(), Some("gen-1"));

    let requests = adapter.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].message, "");
    assert_eq!(requests[1].tool_results.as_ref().unwrap().len(), 1);
    let history = requests[1].chat_history.as_ref().unwrap();
    assert_eq!(history.last().unwrap().role, MessageRole::User);
    assert_eq!(history.last().unwrap().message, "what is 1/0?");
}

#[tokio::test]
async fn disconnect_after_two_deltas_persists_partial_text() {
    let store = Arc::new(InMemoryMessageStore::ephemeral());
    let job = new_turn(&store, "hi", None).await;
    let message_id = job.message_id().to_owned();

    let adapter = ScriptedAdapter::new(vec![Script::Hang(vec![
        start("gen-1"),
        delta("Hel"),
        delta("lo"),
    ])]);

    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator = StreamOrchestrator::new(store.clone(), tools(), adapter, settings());
    let handle = tokio::spawn(orchestrator.run(job, tx));

    for _ in 0..3 {
        assert!(rx.recv().await.is_some());
    }
    drop(rx);

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("orchestrator should stop after the client leaves")
        .unwrap();

    assert_eq!(outcome.state, StreamState::Failed);
    assert_eq!(outcome.finish_reason, FinishReason::UserCancel);

    let row = store.get_message(&message_id).await.unwrap().unwrap();
    assert_eq!(row.text, "Hello");
}

#[tokio::test]
async fn provider_error_mid_stream_fails_with_partial_text() {
    let store = Arc::new(InMemoryMessageStore::ephemeral());
    let job = new_turn(&store, "hi", None).await;
    let message_id = job.message_id().to_owned();

    let adapter = ScriptedAdapter::new(vec![Script::Events(vec![
        start("gen-1"),
        delta("partial"),
        ck_domain::stream::GenerationEvent::Error {
            message: "connection reset".into(),
        },
    ])]);
    let (events, outcome) = run_job(store.clone(), adapter, job).await;

    let last = events.last().unwrap();
    assert!(last.is_terminal());
    assert_eq!(last.finish_reason, Some(FinishReason::Error));
    assert_eq!(last.error.as_deref(), Some("connection reset"));
    assert_eq!(outcome.state, StreamState::Failed);

    let row = store.get_message(&message_id).await.unwrap().unwrap();
    assert_eq!(row.text, "partial");
}

#[tokio::test]
async fn open_failure_sends_a_single_terminal_event() {
    let store = Arc::new(InMemoryMessageStore::ephemeral());
    let job = new_turn(&store, "hi", None).await;

    let adapter = ScriptedAdapter::new(vec![Script::Fail("HTTP 503".into())]);
    let (events, outcome) = run_job(store, adapter, job).await;

    assert_eq!(events.len(), 1);
    assert!(events[0].is_terminal());
    assert_eq!(events[0].finish_reason, Some(FinishReason::Error));
    assert!(events[0].error.as_deref().unwrap().contains("HTTP 503"));
    assert_eq!(outcome.state, StreamState::Failed);
}

#[tokio::test]
async fn data_before_start_is_a_protocol_violation() {
    let store = Arc::new(InMemoryMessageStore::ephemeral());
    let job = new_turn(&store, "hi", None).await;

    let adapter = ScriptedAdapter::new(vec![Script::Events(vec![
        delta("too early"),
        end(FinishReason::Complete),
    ])]);
    let (events, outcome) = run_job(store, adapter, job).await;

    assert_eq!(events.len(), 1);
    assert_eq!(outcome.state, StreamState::Failed);
    assert_eq!(outcome.text, "");
}

#[tokio::test]
async fn transient_store_failure_is_retried() {
    let store = Arc::new(FlakyStore::transient(1));
    let job = new_turn(&store.inner, "hi", None).await;
    let id = job.message_id().to_owned();

    let adapter = ScriptedAdapter::new(vec![Script::Events(hello_world())]);
    let (_, outcome) = run_job(store.clone(), adapter, job).await;

    assert_eq!(outcome.state, StreamState::Completed);
    assert_eq!(store.inner.get_message(&id).await.unwrap().unwrap().text, "Hello, world");
}

#[tokio::test]
async fn broken_store_does_not_stop_the_stream() {
    let store = Arc::new(FlakyStore::broken());
    let job = new_turn(&store.inner, "hi", None).await;

    let adapter = ScriptedAdapter::new(vec![Script::Events(hello_world())]);
    let (events, outcome) = run_job(store, adapter, job).await;

    assert_eq!(events.len(), 5);
    assert_eq!(outcome.state, StreamState::Completed);
    assert_eq!(outcome.text, "Hello, world");
}

#[tokio::test]
async fn regeneration_reports_superseded_ids_on_first_event_only() {
    let store = Arc::new(InMemoryMessageStore::ephemeral());
    let first = new_turn(&store, "hi", Some("conv-1")).await;
    let old_id = first.message_id().to_owned();
    run_job(
        store.clone(),
        ScriptedAdapter::new(vec![Script::Events(hello_world())]),
        first,
    )
    .await;

    let mut request = ChatRequest::new("");
    request.conversation_id = Some("conv-1".into());
    let regen = process_regeneration(
        store.as_ref(),
        &tools(),
        &ChatConfig::default(),
        request,
        Context::new().with_user("u1"),
    )
    .await
    .unwrap();
    assert_eq!(regen.superseded_ids, vec![old_id.clone()]);

    let job = StreamJob::from_processed(regen.chat).with_previous_ids(regen.superseded_ids);
    let new_id = job.message_id().to_owned();
    let (events, _) = run_job(
        store.clone(),
        ScriptedAdapter::new(vec![Script::Events(hello_world())]),
        job,
    )
    .await;

    assert_eq!(
        events[0].previous_response_message_ids,
        Some(vec![old_id.clone()])
    );
    assert!(events[1..]
        .iter()
        .all(|e| e.previous_response_message_ids.is_none()));

    let old = store.get_message(&old_id).await.unwrap().unwrap();
    let new = store.get_message(&new_id).await.unwrap().unwrap();
    assert!(!old.is_active);
    assert!(new.is_active);
    assert_eq!(old.position, new.position);
}

#[tokio::test]
async fn parallel_variants_share_a_group_and_adjacent_positions() {
    let store = Arc::new(InMemoryMessageStore::ephemeral());
    let pair = ParallelPair::prepare(
        store.as_ref(),
        &tools(),
        &ChatConfig::default(),
        ChatRequest::new("hi"),
        Context::new().with_user("u1"),
    )
    .await
    .unwrap();
    let group = pair.group_id.clone();
    let [first_id, second_id] = pair.response_ids();
    let conversation_id = pair.chat.conversation_id().to_owned();

    let adapter = ScriptedAdapter::new(vec![
        Script::Events(hello_world()),
        Script::Events(hello_world()),
    ]);
    let (tx, mut rx) = mpsc::channel(64);
    let [a, b] = pair.into_jobs();
    let handles = [
        tokio::spawn(
            StreamOrchestrator::new(store.clone(), tools(), adapter.clone(), settings()).run(a, tx.clone()),
        ),
        tokio::spawn(StreamOrchestrator::new(store.clone(), tools(), adapter, settings()).run(b, tx)),
    ];

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().state, StreamState::Completed);
    }

    assert_eq!(events.len(), 10);
    assert!(events.iter().all(|e| e.parallel_group_id.as_deref() == Some(group.as_str())));
    let variants: BTreeSet<u8> = events.iter().filter_map(|e| e.parallel_variant).collect();
    assert_eq!(variants, BTreeSet::from([1, 2]));

    let first = store.get_message(&first_id).await.unwrap().unwrap();
    let second = store.get_message(&second_id).await.unwrap().unwrap();
    assert_eq!(second.position, first.position + 1);
    assert_eq!(first.parallel_group_id, second.parallel_group_id);
    assert_eq!(second.parallel_variant, Some(2));
    assert_eq!(second.text, "Hello, world");

    let rows = store.list_messages(&conversation_id, false).await.unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn failed_supersede_keeps_the_previous_reply_active() {
    let store = FlakyStore::refusing_next_supersede();
    store
        .create_message(MessageDraft::user("conv-1", "u1", "hi", 0))
        .await
        .unwrap();
    let mut reply = MessageDraft::placeholder("conv-1", "u1", 0);
    reply.text = "Hello, world".into();
    let old = store.create_message(reply).await.unwrap();

    let mut request = ChatRequest::new("");
    request.conversation_id = Some("conv-1".into());
    let result = process_regeneration(
        &store,
        &tools(),
        &ChatConfig::default(),
        request,
        Context::new().with_user("u1"),
    )
    .await;
    assert!(result.is_err());

    let active_replies: Vec<_> = store
        .list_messages("conv-1", true)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.role == MessageRole::Chatbot)
        .collect();
    assert_eq!(active_replies.len(), 1);
    assert_eq!(active_replies[0].id, old.id);
}
