//! Cohere platform adapter.
//!
//! Speaks the `/v1/chat` streaming contract: the request carries
//! `stream: true` and the response body is newline-delimited JSON, one
//! event object per line.

use serde::Serialize;
use serde_json::Value;

use ck_domain::chat::{ChatRequest, PromptTruncation, DEFAULT_CHAT_MODEL};
use ck_domain::config::DeploymentConfig;
use ck_domain::context::Context;
use ck_domain::error::{Error, Result};
use ck_domain::message::ChatTurn;
use ck_domain::stream::{FinishReason, GenerationEvent, GenerationStream, StreamData};
use ck_domain::tool::{ToolCall, ToolDefinition, ToolResult};

use crate::ndjson::ndjson_event_stream;
use crate::traits::GenerationAdapter;
use crate::util::{from_reqwest, resolve_api_key};

const CLIENT_NAME: &str = "chatkit";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CohereAdapter {
    name: String,
    base_url: String,
    api_key: String,
    models: Vec<String>,
    default_model: String,
    client: reqwest::Client,
}

impl CohereAdapter {
    /// Build an adapter from its deployment config. Fails when no API key
    /// can be resolved.
    pub fn from_config(cfg: &DeploymentConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        let default_model = cfg
            .models
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());

        Ok(Self {
            name: cfg.name.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            models: cfg.models.clone(),
            default_model,
            client,
        })
    }

    // ── Internal: build the JSON body ─────────────────────────────

    fn effective_model<'a>(&'a self, req: &'a ChatRequest, ctx: &'a Context) -> &'a str {
        req.model
            .as_deref()
            .or(ctx.model.as_deref())
            .unwrap_or(&self.default_model)
    }

    fn build_chat_body<'a>(
        &'a self,
        req: &'a ChatRequest,
        tools: &'a [ToolDefinition],
        ctx: &'a Context,
    ) -> CohereChatBody<'a> {
        CohereChatBody {
            message: &req.message,
            model: self.effective_model(req, ctx),
            stream: true,
            preamble: req.preamble.as_deref(),
            chat_history: req.chat_history.as_deref().filter(|h| !h.is_empty()),
            temperature: req.temperature,
            k: req.k,
            p: req.p,
            max_tokens: req.max_tokens,
            seed: req.seed,
            stop_sequences: req.stop_sequences.as_deref(),
            presence_penalty: req.presence_penalty,
            frequency_penalty: req.frequency_penalty,
            prompt_truncation: req.prompt_truncation,
            tools: tools.iter().map(ToolDefinition::to_provider_schema).collect(),
            tool_results: req.tool_results.as_deref(),
            documents: Some(req.documents.as_slice()).filter(|d| !d.is_empty()),
            force_single_step: req.force_single_step,
            search_queries_only: req.search_queries_only,
        }
    }
}

#[derive(Debug, Serialize)]
struct CohereChatBody<'a> {
    message: &'a str,
    model: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    preamble: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_history: Option<&'a [ChatTurn]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    prompt_truncation: PromptTruncation,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_results: Option<&'a [ToolResult]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    documents: Option<&'a [Value]>,
    force_single_step: bool,
    search_queries_only: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream event parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-stream parser state. A step that produced tool calls reports
/// `TOOL_CALLS` at its end regardless of what the platform says.
#[derive(Debug, Default)]
pub(crate) struct CohereEventParser {
    saw_tool_calls: bool,
}

impl CohereEventParser {
    pub(crate) fn parse_line(&mut self, line: &str) -> Vec<GenerationEvent> {
        let v: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed stream line");
                return Vec::new();
            }
        };

        let event_type = v.get("event_type").and_then(Value::as_str).unwrap_or("");

        match event_type {
            "stream-start" => vec![GenerationEvent::StreamStart {
                generation_id: v
                    .get("generation_id")
                    .and_then(Value::as_str)
                    .map(String::from),
            }],
            "text-generation" => match v.get("text").and_then(Value::as_str) {
                Some(text) if !text.is_empty() => {
                    vec![GenerationEvent::StreamData(StreamData::TextDelta {
                        text: text.to_string(),
                    })]
                }
                _ => Vec::new(),
            },
            "tool-calls-generation" => {
                let calls = parse_tool_calls(&v);
                self.saw_tool_calls |= !calls.is_empty();
                calls
                    .into_iter()
                    .map(|c| GenerationEvent::StreamData(StreamData::ToolCall(c)))
                    .collect()
            }
            "citation-generation" => {
                let citations = v
                    .get("citations")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                vec![GenerationEvent::StreamData(StreamData::Citations { citations })]
            }
            "stream-end" => {
                let raw = v
                    .get("finish_reason")
                    .and_then(Value::as_str)
                    .unwrap_or("COMPLETE");
                let mut finish_reason = FinishReason::from_provider(raw);
                if self.saw_tool_calls && !finish_reason.is_error() {
                    finish_reason = FinishReason::ToolCalls;
                }
                vec![GenerationEvent::StreamEnd { finish_reason }]
            }
            other => vec![GenerationEvent::StreamData(StreamData::Opaque {
                event_type: if other.is_empty() { "unknown" } else { other }.to_string(),
                payload: v.clone(),
            })],
        }
    }
}

fn parse_tool_calls(v: &Value) -> Vec<ToolCall> {
    let Some(arr) = v.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|tc| {
            let name = tc.get("name")?.as_str()?.to_string();
            let parameters = tc
                .get("parameters")
                .cloned()
                .unwrap_or(Value::Object(Default::default()));
            Some(ToolCall { name, parameters })
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl GenerationAdapter for CohereAdapter {
    async fn generate(
        &self,
        request: &ChatRequest,
        tools: &[ToolDefinition],
        ctx: &Context,
    ) -> Result<GenerationStream> {
        let url = format!("{}/v1/chat", self.base_url);
        let body = self.build_chat_body(request, tools, ctx);

        tracing::debug!(
            deployment = %self.name,
            url = %url,
            model = %body.model,
            tools = body.tools.len(),
            has_tool_results = body.tool_results.is_some(),
            "cohere chat request"
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Client-Name", CLIENT_NAME)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: self.name.clone(),
                message: format!("HTTP {status}: {text}"),
            });
        }

        let mut parser = CohereEventParser::default();
        Ok(ndjson_event_stream(resp.bytes_stream(), move |line| {
            parser.parse_line(line)
        }))
    }

    fn deployment(&self) -> &str {
        &self.name
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
