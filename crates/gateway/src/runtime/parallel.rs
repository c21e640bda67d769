//! Parallel variants: two independent generations for the same prompt,
//! sharing one event channel. Variant 1 reuses the normalizer's placeholder;
//! variant 2 reserves an id one position later and creates its row on its
//! own `stream-start`.

use ck_domain::chat::ChatRequest;
use ck_domain::config::ChatConfig;
use ck_domain::context::Context;
use ck_domain::error::Result;
use ck_domain::message::MessageDraft;
use ck_store::MessageStore;
use ck_tools::ToolRegistry;

use super::normalizer::{process_chat_grouped, ProcessedChat};
use super::orchestrator::{ResponseSlot, StreamJob};

#[derive(Debug, Clone)]
pub struct ParallelPair {
    pub group_id: String,
    pub chat: ProcessedChat,
    /// Reserved before the row exists so every event can reference it.
    pub second_id: String,
}

impl ParallelPair {
    /// Normalize `request` once for both variants.
    pub async fn prepare(
        store: &dyn MessageStore,
        tools: &ToolRegistry,
        config: &ChatConfig,
        request: ChatRequest,
        ctx: Context,
    ) -> Result<Self> {
        let group_id = uuid::Uuid::new_v4().to_string();
        let chat = process_chat_grouped(store, tools, config, request, ctx, Some(&group_id)).await?;
        Ok(Self {
            group_id,
            chat,
            second_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    pub fn response_ids(&self) -> [String; 2] {
        [self.chat.response_message.id.clone(), self.second_id.clone()]
    }

    pub fn into_jobs(self) -> [StreamJob; 2] {
        let chat = self.chat;
        let reply = &chat.response_message;
        let second = MessageDraft::placeholder(
            &reply.conversation_id,
            &reply.user_id,
            reply.position + 1,
        )
        .with_id(self.second_id)
        .with_parallel(&self.group_id, 2);

        let mut first = StreamJob::from_processed(chat);
        first.ctx = first.ctx.with_parallel_variant(1);

        let second = StreamJob {
            request: first.request.clone(),
            tools: first.tools.clone(),
            ctx: first.ctx.clone().with_parallel_variant(2),
            slot: ResponseSlot::lazy(second),
            should_store: first.should_store,
            previous_response_message_ids: None,
        };
        [first, second]
    }
}
