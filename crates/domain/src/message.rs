use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageRole {
    User,
    Chatbot,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persisted message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A conversation message as stored by the message store.
///
/// Superseded messages are flagged `is_active = false`, never removed.
/// Parallel variants come in pairs: same `parallel_group_id`, variants 1
/// and 2, with variant 2 one position after variant 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub text: String,
    pub role: MessageRole,
    pub position: i64,
    pub is_active: bool,
    #[serde(default)]
    pub generation_id: Option<String>,
    #[serde(default)]
    pub is_parallel: bool,
    #[serde(default)]
    pub parallel_group_id: Option<String>,
    #[serde(default)]
    pub parallel_variant: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Materialize a draft, assigning an id when the draft has none.
    pub fn from_draft(draft: MessageDraft) -> Self {
        let now = Utc::now();
        Self {
            id: draft
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            conversation_id: draft.conversation_id,
            user_id: draft.user_id,
            text: draft.text,
            role: draft.role,
            position: draft.position,
            is_active: draft.is_active,
            generation_id: None,
            is_parallel: draft.parallel_group_id.is_some(),
            parallel_group_id: draft.parallel_group_id,
            parallel_variant: draft.parallel_variant,
            created_at: now,
            updated_at: now,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Draft
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to `MessageStore::create_message`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    /// Pre-assigned id. Parallel variant 2 reserves its id before its row
    /// exists so every wire event can reference it.
    pub id: Option<String>,
    pub conversation_id: String,
    pub user_id: String,
    pub text: String,
    pub role: MessageRole,
    pub position: i64,
    pub is_active: bool,
    pub parallel_group_id: Option<String>,
    pub parallel_variant: Option<u8>,
}

impl MessageDraft {
    pub fn user(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
        position: i64,
    ) -> Self {
        Self {
            id: None,
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            text: text.into(),
            role: MessageRole::User,
            position,
            is_active: true,
            parallel_group_id: None,
            parallel_variant: None,
        }
    }

    /// An empty, active assistant message awaiting streamed text.
    pub fn placeholder(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        position: i64,
    ) -> Self {
        Self {
            id: None,
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            text: String::new(),
            role: MessageRole::Chatbot,
            position,
            is_active: true,
            parallel_group_id: None,
            parallel_variant: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_parallel(mut self, group_id: impl Into<String>, variant: u8) -> Self {
        self.parallel_group_id = Some(group_id.into());
        self.parallel_variant = Some(variant);
        self
    }
}

/// A prior turn handed to the provider as chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub message: String,
}

impl From<&Message> for ChatTurn {
    fn from(m: &Message) -> Self {
        Self {
            role: m.role,
            message: m.text.clone(),
        }
    }
}
