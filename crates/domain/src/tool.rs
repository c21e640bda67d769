use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub parameters: Value,
}

/// The outputs a tool produced for one call, fed back to the model on the
/// next step of a multi-step turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call: ToolCall,
    pub outputs: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolCategory {
    #[serde(rename = "Data loader")]
    DataLoader,
    #[serde(rename = "File loader")]
    FileLoader,
    #[serde(rename = "Function")]
    Function,
    #[serde(rename = "Web search")]
    WebSearch,
}

/// One named parameter in a tool's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
}

/// Parameter types a model can produce as literal arguments.
const FILLABLE_TYPES: &[&str] = &[
    "str", "string", "int", "integer", "float", "number", "bool", "boolean", "list", "array",
    "dict", "object",
];

impl ParameterDefinition {
    pub fn new(description: impl Into<String>, kind: impl Into<String>, required: bool) -> Self {
        Self {
            description: description.into(),
            kind: kind.into(),
            required,
        }
    }

    /// Whether a model can fill this parameter from text alone. Types like
    /// `file` or `List[Document]` need an upstream loader.
    pub fn is_model_fillable(&self) -> bool {
        let kind = self.kind.trim().to_ascii_lowercase();
        FILLABLE_TYPES.contains(&kind.as_str())
            || (kind.starts_with("list[") && !kind.contains("document"))
    }
}

/// External credentials a tool needs before it becomes usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ToolAuth {
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub token_required: bool,
}

/// Declarative descriptor for a registered tool.
///
/// `is_available` is recomputed by the registry every time a definition is
/// requested; it is never cached past a single resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub category: ToolCategory,
    #[serde(default)]
    pub parameter_definitions: BTreeMap<String, ParameterDefinition>,
    pub is_visible: bool,
    pub is_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<ToolAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolDefinition {
    /// Names of parameters marked `required`.
    pub fn required_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameter_definitions
            .iter()
            .filter(|(_, p)| p.required)
            .map(|(name, _)| name.as_str())
    }

    /// Shape sent to the provider's `tools` field.
    pub fn to_provider_schema(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameter_definitions": self.parameter_definitions,
        })
    }
}

/// Build the `[{"status": "error", "details": ...}]` fragment returned in
/// place of real tool output when a call fails.
pub fn tool_error_fragment(details: impl Into<String>) -> Vec<Value> {
    vec![serde_json::json!({
        "status": "error",
        "details": details.into(),
    })]
}
