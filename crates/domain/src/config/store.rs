use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `messages.json`.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// Keep messages in memory only when false.
    #[serde(default = "d_true")]
    pub persist: bool,
    #[serde(default = "d_flush_secs")]
    pub flush_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            persist: true,
            flush_interval_secs: d_flush_secs(),
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}
fn d_true() -> bool {
    true
}
fn d_flush_secs() -> u64 {
    30
}
