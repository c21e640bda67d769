//! HTTP surface tests: the full router driven with `tower::ServiceExt::oneshot`.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use ck_domain::config::Config;
use ck_gateway::api;
use ck_gateway::state::AppState;
use ck_providers::DeploymentRegistry;
use ck_store::InMemoryMessageStore;

use common::*;

const TOKEN: &str = "test-token";

fn state_with(scripts: Vec<Script>) -> AppState {
    let adapter = ScriptedAdapter::new(scripts);
    AppState {
        config: Arc::new(Config::default()),
        store: Arc::new(InMemoryMessageStore::ephemeral()),
        tools: tools(),
        deployments: Arc::new(DeploymentRegistry::new().register(adapter)),
        api_token_hash: Some(Sha256::digest(TOKEN.as_bytes()).to_vec()),
    }
}

fn app(state: &AppState) -> Router {
    api::router(state.clone()).with_state(state.clone())
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .header("content-type", "application/json")
        .header("user-id", "u1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_str(&body_string(resp).await).unwrap()
}

/// `data:` payloads of an SSE body, in order.
fn sse_payloads(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|d| serde_json::from_str(d.trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn health_is_public() {
    let state = state_with(vec![]);
    let resp = app(&state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "ok");
}

#[tokio::test]
async fn v1_routes_require_the_token() {
    let state = state_with(vec![]);

    let resp = app(&state)
        .oneshot(Request::builder().uri("/v1/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/tools")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app(&state)
        .oneshot(get("/v1/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let tools = body_json(resp).await;
    let names: Vec<&str> = tools
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["toolkit_calculator", "toolkit_meeting_setup"]);
}

#[tokio::test]
async fn lists_deployments() {
    let state = state_with(vec![]);
    let resp = app(&state)
        .oneshot(get("/v1/deployments").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["deployments"][0]["name"], "scripted");
    assert_eq!(json["deployments"][0]["is_default"], true);
}

#[tokio::test]
async fn unknown_deployment_is_rejected_before_any_rows_exist() {
    let state = state_with(vec![Script::Events(hello_world())]);
    let mut req = post_json("/v1/chat-stream", serde_json::json!({"message": "hi"}));
    req.headers_mut()
        .insert("deployment-name", "nope".parse().unwrap());

    let resp = app(&state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "invalid_deployment");
    assert_eq!(state.store.message_count(), 0);
}

#[tokio::test]
async fn out_of_range_parameters_are_422() {
    let state = state_with(vec![]);
    let resp = app(&state)
        .oneshot(post_json(
            "/v1/chat-stream",
            serde_json::json!({"message": "hi", "p": 1.5, "k": 900}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "validation_error");
    assert_eq!(json["details"].as_array().unwrap().len(), 2);
    assert_eq!(state.store.message_count(), 0);
}

#[tokio::test]
async fn undeserializable_bodies_get_the_validation_error_shape() {
    let state = state_with(vec![]);
    for body in [
        serde_json::json!({"message": "hi", "k": -1}),
        serde_json::json!({"message": "hi", "prompt_truncation": "SOMETIMES"}),
        serde_json::json!({"k": 3}),
    ] {
        let resp = app(&state)
            .oneshot(post_json("/v1/chat-stream", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "validation_error");
        assert_eq!(json["details"].as_array().unwrap().len(), 1);
    }

    let resp = app(&state)
        .oneshot(
            get("/v1/chat")
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["error"], "validation_error");
    assert_eq!(state.store.message_count(), 0);
}

#[tokio::test]
async fn non_streaming_chat_returns_the_full_reply() {
    let state = state_with(vec![Script::Events(hello_world())]);
    let resp = app(&state)
        .oneshot(post_json("/v1/chat", serde_json::json!({"message": "hi"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["text"], "Hello, world");
    assert_eq!(json["generation_id"], "gen-1");
    assert_eq!(json["finish_reason"], "COMPLETE");
    assert!(json.get("error").is_none());
    assert_eq!(state.store.message_count(), 2);
}

#[tokio::test]
async fn chat_stream_sends_named_sse_events() {
    let state = state_with(vec![Script::Events(hello_world())]);
    let resp = app(&state)
        .oneshot(post_json(
            "/v1/chat-stream",
            serde_json::json!({"message": "hi", "conversation_id": "conv-9"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = body_string(resp).await;
    assert!(body.contains("event: stream-start"));
    assert!(body.contains("event: stream-end"));

    let payloads = sse_payloads(&body);
    assert_eq!(payloads.len(), 5);
    assert_eq!(payloads[0]["conversation_id"], "conv-9");
    assert_eq!(payloads[4]["finish_reason"], "COMPLETE");

    // Persisted and readable back through the API.
    let resp = app(&state)
        .oneshot(
            get("/v1/conversations/conv-9/messages")
                .header("user-id", "u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["count"], 2);
    assert_eq!(json["messages"][1]["text"], "Hello, world");

    // Someone else's conversation looks absent.
    let resp = app(&state)
        .oneshot(
            get("/v1/conversations/conv-9/messages")
                .header("user-id", "intruder")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn regenerating_an_unknown_conversation_is_404() {
    let state = state_with(vec![]);
    let resp = app(&state)
        .oneshot(post_json(
            "/v1/chat-stream/regenerate",
            serde_json::json!({"message": "", "conversation_id": "missing"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn human_feedback_streams_two_variants_and_echoes_stream_id() {
    let state = state_with(vec![
        Script::Events(hello_world()),
        Script::Events(hello_world()),
    ]);
    let mut req = post_json(
        "/v1/chat-human-feedback",
        serde_json::json!({"message": "hi", "human_feedback": {"rating": 1}}),
    );
    req.headers_mut().insert("stream-id", "s-123".parse().unwrap());

    let resp = app(&state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-stream-id"], "s-123");

    let payloads = sse_payloads(&body_string(resp).await);
    assert_eq!(payloads.len(), 10);
    let ends: Vec<&Value> = payloads
        .iter()
        .filter(|p| p["event_type"] == "stream-end")
        .collect();
    assert_eq!(ends.len(), 2);
    assert_ne!(ends[0]["parallel_variant"], ends[1]["parallel_variant"]);
    assert_eq!(ends[0]["parallel_group_id"], ends[1]["parallel_group_id"]);
    assert_eq!(state.store.message_count(), 3);
}
