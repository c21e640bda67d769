//! Outward stream events.
//!
//! [`to_wire_event`] is a pure mapping from a [`GenerationEvent`] plus the
//! identity of the response being built to the JSON object clients see. It
//! never touches the store or the network.

use serde::Serialize;
use serde_json::Value;

use ck_domain::stream::{FinishReason, GenerationEvent, StreamData};
use ck_domain::tool::{ToolCall, ToolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireEventType {
    StreamStart,
    StreamData,
    StreamEnd,
}

impl WireEventType {
    /// SSE `event:` name.
    pub fn as_str(&self) -> &'static str {
        match self {
            WireEventType::StreamStart => "stream-start",
            WireEventType::StreamData => "stream-data",
            WireEventType::StreamEnd => "stream-end",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireEvent {
    pub event_type: WireEventType,
    pub response_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_message_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_variant: Option<u8>,
}

impl WireEvent {
    fn new(event_type: WireEventType, meta: &WireMeta) -> Self {
        Self {
            event_type,
            response_id: meta.response_id.clone(),
            conversation_id: meta.conversation_id.clone(),
            generation_id: meta.generation_id.clone(),
            data_type: None,
            text: None,
            tool_calls: None,
            tool_results: None,
            citations: None,
            payload: None,
            finish_reason: None,
            error: None,
            previous_response_message_ids: None,
            parallel_group_id: meta.parallel_group_id.clone(),
            parallel_variant: meta.parallel_variant,
        }
    }

    /// Terminal event with an explicit finish reason. Used when the stream
    /// fails before or outside the adapter's own events.
    pub fn end(meta: &WireMeta, finish_reason: FinishReason, error: Option<String>) -> Self {
        Self {
            finish_reason: Some(finish_reason),
            error,
            ..Self::new(WireEventType::StreamEnd, meta)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type == WireEventType::StreamEnd
    }
}

/// Identity of the response the events belong to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireMeta {
    pub response_id: String,
    pub conversation_id: Option<String>,
    pub generation_id: Option<String>,
    pub parallel_group_id: Option<String>,
    pub parallel_variant: Option<u8>,
}

pub fn to_wire_event(event: &GenerationEvent, meta: &WireMeta) -> WireEvent {
    match event {
        GenerationEvent::StreamStart { generation_id } => WireEvent {
            generation_id: generation_id.clone().or_else(|| meta.generation_id.clone()),
            ..WireEvent::new(WireEventType::StreamStart, meta)
        },
        GenerationEvent::StreamData(data) => {
            let mut wire = WireEvent::new(WireEventType::StreamData, meta);
            wire.data_type = Some(data.type_name().to_string());
            match data {
                StreamData::TextDelta { text } => wire.text = Some(text.clone()),
                StreamData::ToolCall(call) => wire.tool_calls = Some(vec![call.clone()]),
                StreamData::ToolResult(result) => wire.tool_results = Some(vec![result.clone()]),
                StreamData::Citations { citations } => wire.citations = Some(citations.clone()),
                StreamData::Opaque { payload, .. } => wire.payload = Some(payload.clone()),
            }
            wire
        }
        GenerationEvent::StreamEnd { finish_reason } => WireEvent::end(meta, *finish_reason, None),
        GenerationEvent::Error { message } => {
            WireEvent::end(meta, FinishReason::Error, Some(message.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> WireMeta {
        WireMeta {
            response_id: "msg-1".into(),
            conversation_id: Some("conv-1".into()),
            generation_id: Some("gen-1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn text_delta_maps_to_stream_data() {
        let ev = GenerationEvent::StreamData(StreamData::TextDelta { text: "Hi".into() });
        let json = serde_json::to_value(to_wire_event(&ev, &meta())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event_type": "stream-data",
                "response_id": "msg-1",
                "conversation_id": "conv-1",
                "generation_id": "gen-1",
                "data_type": "text-generation",
                "text": "Hi",
            })
        );
    }

    #[test]
    fn unknown_event_keeps_its_type_name() {
        let ev = GenerationEvent::StreamData(StreamData::Opaque {
            event_type: "search-results".into(),
            payload: serde_json::json!({"documents": []}),
        });
        let wire = to_wire_event(&ev, &meta());
        assert_eq!(wire.event_type, WireEventType::StreamData);
        assert_eq!(wire.data_type.as_deref(), Some("search-results"));
        assert_eq!(wire.payload, Some(serde_json::json!({"documents": []})));
    }

    #[test]
    fn provider_error_maps_to_error_end() {
        let ev = GenerationEvent::Error { message: "boom".into() };
        let wire = to_wire_event(&ev, &meta());
        assert!(wire.is_terminal());
        assert_eq!(wire.finish_reason, Some(FinishReason::Error));
        assert_eq!(wire.error.as_deref(), Some("boom"));
    }

    #[test]
    fn parallel_tags_ride_on_every_event() {
        let mut m = meta();
        m.parallel_group_id = Some("grp".into());
        m.parallel_variant = Some(2);
        let json = serde_json::to_value(to_wire_event(
            &GenerationEvent::StreamEnd { finish_reason: FinishReason::Complete },
            &m,
        ))
        .unwrap();
        assert_eq!(json["parallel_group_id"], "grp");
        assert_eq!(json["parallel_variant"], 2);
        assert_eq!(json["finish_reason"], "COMPLETE");
    }

    #[test]
    fn stream_start_prefers_event_generation_id() {
        let ev = GenerationEvent::StreamStart { generation_id: Some("gen-9".into()) };
        let wire = to_wire_event(&ev, &WireMeta { response_id: "m".into(), ..Default::default() });
        assert_eq!(wire.event_type.as_str(), "stream-start");
        assert_eq!(wire.generation_id.as_deref(), Some("gen-9"));
        assert!(wire.conversation_id.is_none());
    }
}
