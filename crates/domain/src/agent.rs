use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Id of the built-in agent every user can select.
pub const DEFAULT_AGENT_ID: &str = "default";

/// A saved chat configuration a user can select to bias responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub preamble: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Owner. `None` for built-in agents.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

impl Agent {
    /// The built-in agent.
    pub fn default_agent() -> Self {
        Self {
            id: DEFAULT_AGENT_ID.into(),
            name: "Command R+".into(),
            description: "Ask questions and get answers based on your files.".into(),
            preamble: None,
            temperature: Some(0.3),
            tools: vec![
                "toolkit_calculator".into(),
                "toolkit_meeting_setup".into(),
            ],
            deployment: None,
            model: Some("command-r-plus".into()),
            user_id: None,
            organization_id: None,
            is_private: false,
        }
    }

    /// Private agents are only visible to their owner.
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        !self.is_private || self.user_id.as_deref() == Some(user_id)
    }
}

/// Per-agent tool overrides, such as the files a retrieval tool may read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentToolMetadata {
    pub id: String,
    pub agent_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub artifacts: Vec<Value>,
}
