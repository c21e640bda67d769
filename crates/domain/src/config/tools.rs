use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Built-in tool switches. A disabled tool stays registered but reports
/// itself unavailable, so resolution filters it out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub calculator: ToolToggle,
    #[serde(default)]
    pub meeting_setup: ToolToggle,
    /// Hard timeout for a single tool call.
    #[serde(default = "d_30")]
    pub call_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            calculator: ToolToggle::default(),
            meeting_setup: ToolToggle::default(),
            call_timeout_secs: d_30(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToolToggle {
    #[serde(default = "d_true")]
    pub enabled: bool,
}

impl Default for ToolToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn d_true() -> bool {
    true
}
fn d_30() -> u64 {
    30
}
