//! Request normalization: turn an incoming chat request into everything a
//! generation needs (resolved agent, model, conversation, history, tools)
//! and create the rows the stream will write into.

use ck_domain::agent::Agent;
use ck_domain::chat::{ChatRequest, RequestedTool};
use ck_domain::config::ChatConfig;
use ck_domain::context::Context;
use ck_domain::error::{Error, Result};
use ck_domain::message::{ChatTurn, Message, MessageDraft, MessageRole};
use ck_domain::tool::ToolDefinition;
use ck_domain::trace::TraceEvent;
use ck_store::MessageStore;
use ck_tools::ToolRegistry;

/// Output of [`process_chat`].
#[derive(Debug, Clone)]
pub struct ProcessedChat {
    /// Request with model, history and agent defaults filled in.
    pub request: ChatRequest,
    /// Persisted when `should_store`, otherwise only built in memory.
    pub response_message: Message,
    pub should_store: bool,
    pub managed_tools: Vec<ToolDefinition>,
    pub next_position: i64,
    pub ctx: Context,
}

impl ProcessedChat {
    pub fn conversation_id(&self) -> &str {
        &self.response_message.conversation_id
    }
}

/// Output of [`process_regeneration`].
#[derive(Debug, Clone)]
pub struct ProcessedRegeneration {
    pub chat: ProcessedChat,
    /// Replies at the regenerated position that were marked inactive.
    pub superseded_ids: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// New turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn process_chat(
    store: &dyn MessageStore,
    tools: &ToolRegistry,
    config: &ChatConfig,
    request: ChatRequest,
    ctx: Context,
) -> Result<ProcessedChat> {
    process_chat_grouped(store, tools, config, request, ctx, None).await
}

/// [`process_chat`] for the first variant of a parallel pair: the
/// placeholder is tagged with `parallel_group_id` as variant 1.
pub async fn process_chat_grouped(
    store: &dyn MessageStore,
    tools: &ToolRegistry,
    config: &ChatConfig,
    request: ChatRequest,
    ctx: Context,
    parallel_group_id: Option<&str>,
) -> Result<ProcessedChat> {
    request.validate()?;

    let (mut request, ctx) = apply_agent(store, request, ctx).await?;
    let (conversation_id, ctx) = apply_model_and_conversation(config, &mut request, ctx);

    let should_store = request.chat_history.is_none();

    let next_position = if should_store {
        let history = store.list_messages(&conversation_id, true).await?;
        request.chat_history = Some(history_turns(history.iter()));
        store
            .get_max_position(&conversation_id)
            .await?
            .map_or(0, |p| p + 1)
    } else {
        0
    };

    let mut draft = MessageDraft::placeholder(&conversation_id, &ctx.user_id, next_position);
    if let Some(group) = parallel_group_id {
        draft = draft.with_parallel(group, 1);
    }

    let response_message = if should_store {
        store
            .create_message(MessageDraft::user(
                &conversation_id,
                &ctx.user_id,
                &request.message,
                next_position,
            ))
            .await?;
        store.create_message(draft).await?
    } else {
        Message::from_draft(draft)
    };

    let managed_tools = resolve_tools(tools, &request);

    TraceEvent::ChatNormalized {
        conversation_id: conversation_id.clone(),
        model: ctx.model.clone().unwrap_or_default(),
        agent_id: request.agent_id.clone(),
        should_store,
        next_position,
        tools: managed_tools.len(),
    }
    .emit();

    Ok(ProcessedChat {
        request,
        response_message,
        should_store,
        managed_tools,
        next_position,
        ctx,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Regeneration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn process_regeneration(
    store: &dyn MessageStore,
    tools: &ToolRegistry,
    config: &ChatConfig,
    request: ChatRequest,
    ctx: Context,
) -> Result<ProcessedRegeneration> {
    request.validate()?;

    let Some(conversation_id) = request.conversation_id.clone() else {
        return Err(Error::Validation(vec![
            "conversation_id is required to regenerate a reply".into(),
        ]));
    };

    let (mut request, ctx) = apply_agent(store, request, ctx).await?;
    let (_, ctx) = apply_model_and_conversation(config, &mut request, ctx);

    let active = store.list_messages(&conversation_id, true).await?;
    if active.is_empty() {
        return Err(Error::not_found("conversation", conversation_id));
    }

    let Some(last) = active
        .iter()
        .filter(|m| m.role == MessageRole::Chatbot)
        .max_by_key(|m| m.position)
    else {
        return Err(Error::Validation(vec![
            "conversation has no reply to regenerate".into(),
        ]));
    };

    // A parallel pair is one turn spanning its variants' positions; the
    // turn sits at the first of them.
    let turn_positions: Vec<i64> = match &last.parallel_group_id {
        Some(group) => active
            .iter()
            .filter(|m| m.role == MessageRole::Chatbot)
            .filter(|m| m.parallel_group_id.as_deref() == Some(group.as_str()))
            .map(|m| m.position)
            .collect(),
        None => vec![last.position],
    };
    let position = turn_positions.iter().copied().min().unwrap_or(last.position);

    let superseded_ids: Vec<String> = active
        .iter()
        .filter(|m| m.role == MessageRole::Chatbot && turn_positions.contains(&m.position))
        .map(|m| m.id.clone())
        .collect();

    // The prompt is the user turn the superseded reply answered.
    if let Some(prompt) = active
        .iter()
        .find(|m| m.role == MessageRole::User && m.position == position)
    {
        request.message = prompt.text.clone();
    }
    request.chat_history = Some(history_turns(
        active.iter().filter(|m| m.position < position),
    ));

    // The turn keeps at least one active reply: create, then supersede.
    let response_message = store
        .create_message(MessageDraft::placeholder(&conversation_id, &ctx.user_id, position))
        .await?;
    if let Err(e) = store.mark_inactive(&superseded_ids).await {
        tracing::warn!(
            conversation_id = %conversation_id,
            error = %e,
            "superseding previous replies failed, withdrawing the new placeholder"
        );
        if let Err(undo) = store.mark_inactive(std::slice::from_ref(&response_message.id)).await {
            tracing::error!(
                message_id = %response_message.id,
                error = %undo,
                "placeholder withdrawal failed, row needs reconciliation"
            );
        }
        return Err(e.into());
    }

    TraceEvent::MessagesSuperseded {
        conversation_id: conversation_id.clone(),
        position,
        superseded: superseded_ids.len(),
    }
    .emit();

    let managed_tools = resolve_tools(tools, &request);

    Ok(ProcessedRegeneration {
        chat: ProcessedChat {
            request,
            response_message,
            should_store: true,
            managed_tools,
            next_position: position,
            ctx,
        },
        superseded_ids,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared steps
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolve `agent_id` and merge the agent into the request and context.
/// Request fields always win over agent defaults.
async fn apply_agent(
    store: &dyn MessageStore,
    mut request: ChatRequest,
    ctx: Context,
) -> Result<(ChatRequest, Context)> {
    let Some(agent_id) = request.agent_id.clone() else {
        return Ok((request, ctx));
    };

    let agent: Agent = match store.get_agent(&agent_id).await? {
        Some(agent) if agent.is_visible_to(&ctx.user_id) => agent,
        _ => return Err(Error::not_found("agent", agent_id)),
    };
    let metadata = store.get_tool_metadata(&agent.id).await?;

    if request.preamble.is_none() {
        request.preamble = agent.preamble.clone();
    }
    if request.temperature.is_none() {
        request.temperature = agent.temperature;
    }
    if request.model.is_none() {
        request.model = agent.model.clone();
    }
    if request.tools.is_none() && !agent.tools.is_empty() {
        request.tools = Some(
            agent
                .tools
                .iter()
                .map(|name| RequestedTool { name: name.clone() })
                .collect(),
        );
    }

    tracing::debug!(agent_id = %agent.id, tool_metadata = metadata.len(), "agent applied");

    let ctx = ctx
        .with_agent(Some(agent))
        .with_agent_tool_metadata(metadata);
    Ok((request, ctx))
}

fn apply_model_and_conversation(
    config: &ChatConfig,
    request: &mut ChatRequest,
    ctx: Context,
) -> (String, Context) {
    let model = request
        .model
        .clone()
        .unwrap_or_else(|| config.default_model.clone());
    request.model = Some(model.clone());

    let conversation_id = request
        .conversation_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    request.conversation_id = Some(conversation_id.clone());

    let ctx = ctx.with_model(model).with_conversation(conversation_id.clone());
    (conversation_id, ctx)
}

/// Prior turns handed to the model. Empty rows (unfinished placeholders)
/// carry nothing the model can use.
fn history_turns<'a>(messages: impl Iterator<Item = &'a Message>) -> Vec<ChatTurn> {
    messages
        .filter(|m| !m.text.is_empty())
        .map(ChatTurn::from)
        .collect()
}

fn resolve_tools(tools: &ToolRegistry, request: &ChatRequest) -> Vec<ToolDefinition> {
    match request.requested_tool_names() {
        Some(names) => tools.resolve(&names),
        None => Vec::new(),
    }
}
