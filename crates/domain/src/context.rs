//! Per-request context.
//!
//! A [`Context`] is assembled by a chain of consuming `with_*` calls while a
//! request is being normalized, then handed by reference to every later
//! stage. Parallel variants each receive their own clone.

use crate::agent::{Agent, AgentToolMetadata};

pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub user_id: String,
    pub organization_id: Option<String>,
    pub conversation_id: Option<String>,
    pub agent: Option<Agent>,
    pub agent_tool_metadata: Vec<AgentToolMetadata>,
    pub model: Option<String>,
    pub deployment_name: Option<String>,
    pub trace_id: String,
    pub stream_id: Option<String>,
    pub parallel_variant: Option<u8>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A fresh context with a new trace id and an anonymous user.
    pub fn new() -> Self {
        Self {
            user_id: ANONYMOUS_USER.into(),
            organization_id: None,
            conversation_id: None,
            agent: None,
            agent_tool_metadata: Vec::new(),
            model: None,
            deployment_name: None,
            trace_id: uuid::Uuid::new_v4().to_string(),
            stream_id: None,
            parallel_variant: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_organization(mut self, organization_id: Option<String>) -> Self {
        self.organization_id = organization_id;
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_agent(mut self, agent: Option<Agent>) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_agent_tool_metadata(mut self, metadata: Vec<AgentToolMetadata>) -> Self {
        self.agent_tool_metadata = metadata;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_deployment(mut self, deployment_name: Option<String>) -> Self {
        self.deployment_name = deployment_name;
        self
    }

    pub fn with_stream_id(mut self, stream_id: Option<String>) -> Self {
        self.stream_id = stream_id;
        self
    }

    pub fn with_parallel_variant(mut self, variant: u8) -> Self {
        self.parallel_variant = Some(variant);
        self
    }

    /// Tool metadata entries that apply to `tool_name`.
    pub fn tool_metadata_for<'a>(
        &'a self,
        tool_name: &'a str,
    ) -> impl Iterator<Item = &'a AgentToolMetadata> + 'a {
        self.agent_tool_metadata
            .iter()
            .filter(move |m| m.tool_name == tool_name)
    }
}
