//! Message persistence for chatkit.
//!
//! [`MessageStore`] is the boundary the chat pipeline writes through. Every
//! operation is atomic for a single row; callers never need multi-row
//! transactions beyond "create a placeholder, then update the same row".

pub mod memory;

use async_trait::async_trait;

use ck_domain::agent::{Agent, AgentToolMetadata};
use ck_domain::error::Error;
use ck_domain::message::{Message, MessageDraft};

pub use memory::InMemoryMessageStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The backend is momentarily unable to serve the call (lock timeout,
    /// dropped connection). Worth one retry.
    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("message already exists: {0}")]
    Conflict(String),

    #[error("store IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("store JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MessageNotFound(id) => Error::not_found("message", id),
            other => Error::Persistence(other.to_string()),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, draft: MessageDraft) -> StoreResult<Message>;

    /// Replace the text of a message.
    async fn update_message_text(&self, id: &str, text: &str) -> StoreResult<()>;

    async fn set_generation_id(&self, id: &str, generation_id: &str) -> StoreResult<()>;

    async fn mark_active(&self, id: &str) -> StoreResult<()>;

    /// Soft-delete. Rows stay in the store with `is_active = false`.
    async fn mark_inactive(&self, ids: &[String]) -> StoreResult<()>;

    async fn get_message(&self, id: &str) -> StoreResult<Option<Message>>;

    /// Highest position used in the conversation, `None` when it is empty.
    async fn get_max_position(&self, conversation_id: &str) -> StoreResult<Option<i64>>;

    /// Messages ordered by position (user turn before reply), then creation time.
    async fn list_messages(
        &self,
        conversation_id: &str,
        active_only: bool,
    ) -> StoreResult<Vec<Message>>;

    async fn get_agent(&self, agent_id: &str) -> StoreResult<Option<Agent>>;

    async fn get_tool_metadata(&self, agent_id: &str) -> StoreResult<Vec<AgentToolMetadata>>;
}
