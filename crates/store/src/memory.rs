//! In-process message store.
//!
//! Holds every message in a `parking_lot` map keyed by message id. When a
//! state path is configured the store loads `messages.json` at startup and
//! writes it back on [`InMemoryMessageStore::flush_if_dirty`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ck_domain::agent::{Agent, AgentToolMetadata};
use ck_domain::message::{Message, MessageDraft, MessageRole};

use crate::{MessageStore, StoreError, StoreResult};

const SNAPSHOT_FILE: &str = "messages.json";

/// On-disk layout of `messages.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    tool_metadata: Vec<AgentToolMetadata>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    messages: Vec<&'a Message>,
    tool_metadata: &'a [AgentToolMetadata],
}

pub struct InMemoryMessageStore {
    snapshot_path: Option<PathBuf>,
    messages: RwLock<HashMap<String, Message>>,
    agents: RwLock<HashMap<String, Agent>>,
    tool_metadata: RwLock<Vec<AgentToolMetadata>>,
    dirty: AtomicBool,
}

impl InMemoryMessageStore {
    /// A store that never touches disk.
    pub fn ephemeral() -> Self {
        Self {
            snapshot_path: None,
            messages: RwLock::new(HashMap::new()),
            agents: RwLock::new(seed_agents(Vec::new())),
            tool_metadata: RwLock::new(Vec::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Load or create the store at `state_path/messages.json`.
    pub fn open(state_path: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(state_path)?;
        let snapshot_path = state_path.join(SNAPSHOT_FILE);

        let snapshot: Snapshot = if snapshot_path.exists() {
            let raw = std::fs::read_to_string(&snapshot_path)?;
            serde_json::from_str(&raw)?
        } else {
            Snapshot::default()
        };

        tracing::info!(
            messages = snapshot.messages.len(),
            path = %snapshot_path.display(),
            "message store loaded"
        );

        let messages = snapshot
            .messages
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        Ok(Self {
            snapshot_path: Some(snapshot_path),
            messages: RwLock::new(messages),
            agents: RwLock::new(seed_agents(Vec::new())),
            tool_metadata: RwLock::new(snapshot.tool_metadata),
            dirty: AtomicBool::new(false),
        })
    }

    /// Register agents next to the built-in default agent.
    pub fn with_agents(self, agents: Vec<Agent>) -> Self {
        *self.agents.write() = seed_agents(agents);
        self
    }

    pub fn insert_tool_metadata(&self, metadata: AgentToolMetadata) {
        self.tool_metadata.write().push(metadata);
        self.mark_dirty();
    }

    pub fn message_count(&self) -> usize {
        self.messages.read().len()
    }

    /// Write the snapshot to disk if anything changed since the last flush.
    pub async fn flush_if_dirty(&self) -> StoreResult<()> {
        let Some(path) = self.snapshot_path.clone() else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let json = {
            let messages = self.messages.read();
            let mut rows: Vec<&Message> = messages.values().collect();
            rows.sort_by(|a, b| {
                (&a.conversation_id, a.position, a.created_at)
                    .cmp(&(&b.conversation_id, b.position, b.created_at))
            });
            let tool_metadata = self.tool_metadata.read();
            serde_json::to_string_pretty(&SnapshotRef {
                messages: rows,
                tool_metadata: &tool_metadata,
            })?
        };

        let count = self.message_count();
        let result = tokio::task::spawn_blocking(move || {
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, json)?;
            std::fs::rename(&tmp, &path)
        })
        .await
        .map_err(|e| StoreError::Transient(format!("spawn_blocking join: {e}")))?;

        if let Err(e) = result {
            self.mark_dirty();
            return Err(StoreError::Io(e));
        }
        tracing::debug!(messages = count, "message store flushed");
        Ok(())
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Apply `f` to one message row under the write lock.
    fn update_row(&self, id: &str, f: impl FnOnce(&mut Message)) -> StoreResult<()> {
        {
            let mut messages = self.messages.write();
            let msg = messages
                .get_mut(id)
                .ok_or_else(|| StoreError::MessageNotFound(id.to_owned()))?;
            f(msg);
            msg.updated_at = Utc::now();
        }
        self.mark_dirty();
        Ok(())
    }
}

fn seed_agents(agents: Vec<Agent>) -> HashMap<String, Agent> {
    let mut map = HashMap::new();
    let default = Agent::default_agent();
    map.insert(default.id.clone(), default);
    for agent in agents {
        map.insert(agent.id.clone(), agent);
    }
    map
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_message(&self, draft: MessageDraft) -> StoreResult<Message> {
        let msg = Message::from_draft(draft);
        {
            let mut messages = self.messages.write();
            if messages.contains_key(&msg.id) {
                return Err(StoreError::Conflict(msg.id));
            }
            messages.insert(msg.id.clone(), msg.clone());
        }
        self.mark_dirty();
        Ok(msg)
    }

    async fn update_message_text(&self, id: &str, text: &str) -> StoreResult<()> {
        self.update_row(id, |m| {
            m.text.clear();
            m.text.push_str(text);
        })
    }

    async fn set_generation_id(&self, id: &str, generation_id: &str) -> StoreResult<()> {
        self.update_row(id, |m| m.generation_id = Some(generation_id.to_owned()))
    }

    async fn mark_active(&self, id: &str) -> StoreResult<()> {
        self.update_row(id, |m| m.is_active = true)
    }

    async fn mark_inactive(&self, ids: &[String]) -> StoreResult<()> {
        for id in ids {
            self.update_row(id, |m| m.is_active = false)?;
        }
        Ok(())
    }

    async fn get_message(&self, id: &str) -> StoreResult<Option<Message>> {
        Ok(self.messages.read().get(id).cloned())
    }

    async fn get_max_position(&self, conversation_id: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .messages
            .read()
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.position)
            .max())
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        active_only: bool,
    ) -> StoreResult<Vec<Message>> {
        let mut rows: Vec<Message> = self
            .messages
            .read()
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| !active_only || m.is_active)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.position, m.role == MessageRole::Chatbot, m.created_at));
        Ok(rows)
    }

    async fn get_agent(&self, agent_id: &str) -> StoreResult<Option<Agent>> {
        Ok(self.agents.read().get(agent_id).cloned())
    }

    async fn get_tool_metadata(&self, agent_id: &str) -> StoreResult<Vec<AgentToolMetadata>> {
        Ok(self
            .tool_metadata
            .read()
            .iter()
            .filter(|m| m.agent_id == agent_id)
            .cloned()
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
