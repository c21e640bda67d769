//! `toolkit_meeting_setup`: asks the user for the details needed to book a meeting.

use std::collections::BTreeMap;

use serde_json::Value;

use ck_domain::context::Context;
use ck_domain::tool::{ParameterDefinition, ToolCategory, ToolDefinition};

use crate::{unavailable_message, Tool, ToolError};

pub const MEETING_SETUP_ID: &str = "toolkit_meeting_setup";

const DISPLAY_NAME: &str = "Meeting Setup";
const FOLLOW_UP_QUESTION: &str = "Who are you meeting and in which company do they work?";

pub struct MeetingSetup {
    enabled: bool,
}

impl MeetingSetup {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait::async_trait]
impl Tool for MeetingSetup {
    fn id(&self) -> &str {
        MEETING_SETUP_ID
    }

    fn definition(&self) -> ToolDefinition {
        let mut params = BTreeMap::new();
        params.insert(
            "message".to_string(),
            ParameterDefinition::new("The meeting setup request message", "str", true),
        );
        ToolDefinition {
            name: MEETING_SETUP_ID.into(),
            display_name: DISPLAY_NAME.into(),
            description: "Tool for setting up new meetings and scheduling".into(),
            category: ToolCategory::Function,
            parameter_definitions: params,
            is_visible: true,
            is_available: self.enabled,
            auth: None,
            error_message: Some(unavailable_message(DISPLAY_NAME)),
        }
    }

    async fn call(&self, parameters: &Value, ctx: &Context) -> Result<Vec<Value>, ToolError> {
        let message = parameters
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParameter {
                name: "message".into(),
                reason: "expected a string".into(),
            })?;

        tracing::debug!(
            user_id = %ctx.user_id,
            request_chars = message.chars().count(),
            "meeting setup requested"
        );

        Ok(vec![serde_json::json!({
            "status": "success",
            "type": "meeting_setup",
            "action": "query_details",
            "message": FOLLOW_UP_QUESTION,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn asks_for_meeting_details() {
        let tool = MeetingSetup::new(true);
        let out = tool
            .call(
                &serde_json::json!({"message": "schedule a meeting with Ana"}),
                &Context::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["status"], "success");
        assert_eq!(out[0]["action"], "query_details");
        assert_eq!(out[0]["message"], FOLLOW_UP_QUESTION);
    }

    #[tokio::test]
    async fn non_string_message_is_rejected() {
        let tool = MeetingSetup::new(true);
        let err = tool
            .call(&serde_json::json!({"message": 42}), &Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter { .. }));
    }

    #[test]
    fn disabled_tool_carries_error_message() {
        let def = MeetingSetup::new(false).definition();
        assert!(!def.is_available);
        assert!(def.error_message.unwrap().starts_with("Meeting Setup"));
    }
}
