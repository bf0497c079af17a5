use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, FieldErrors};
use crate::models::chat::{Conversation, Message, MessageType};
use crate::state::AppState;

const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostMessageRequest {
    #[serde(default)]
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub other_party_id: Uuid,
    pub unread: usize,
    pub last_message: Option<Message>,
}

fn participant_conversation(
    state: &AppState,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<Conversation, AppError> {
    let conversation = state
        .conversations
        .get(&conversation_id)
        .map(|c| c.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("conversation {conversation_id} not found")))?;
    if !conversation.is_participant(user_id) {
        return Err(AppError::Forbidden(
            "not a participant of this conversation".to_string(),
        ));
    }
    Ok(conversation)
}

fn messages_of(state: &AppState, conversation_id: Uuid) -> Vec<Message> {
    let mut messages: Vec<Message> = state
        .messages
        .iter()
        .filter(|m| m.conversation_id == conversation_id)
        .map(|m| m.value().clone())
        .collect();
    messages.sort_by_key(|m| m.created_at);
    messages
}

pub fn conversations_for(state: &AppState, user_id: Uuid) -> Vec<ConversationSummary> {
    let conversations: Vec<Conversation> = state
        .conversations
        .iter()
        .filter(|c| c.is_participant(user_id))
        .map(|c| c.value().clone())
        .collect();

    let mut summaries: Vec<ConversationSummary> = conversations
        .into_iter()
        .map(|conversation| {
            let messages = messages_of(state, conversation.id);
            let other_party_id = if conversation.sender_id == user_id {
                conversation.traveler_id
            } else {
                conversation.sender_id
            };
            ConversationSummary {
                unread: messages.iter().filter(|m| m.is_unread_for(user_id)).count(),
                last_message: messages.last().cloned(),
                other_party_id,
                conversation,
            }
        })
        .collect();
    summaries.sort_by(|a, b| {
        b.conversation
            .last_message_at
            .cmp(&a.conversation.last_message_at)
    });
    summaries
}

/// Messages oldest first. Reading marks the other party's messages read.
pub fn read_messages(
    state: &AppState,
    conversation_id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<Message>, AppError> {
    participant_conversation(state, conversation_id, user_id)?;

    let mut marked = 0usize;
    for mut message in state.messages.iter_mut() {
        if message.conversation_id == conversation_id && message.is_unread_for(user_id) {
            message.is_read = true;
            message.read_at = Some(now);
            marked += 1;
        }
    }
    if marked > 0 {
        debug!(conversation_id = %conversation_id, user_id = %user_id, marked, "messages marked read");
    }
    Ok(messages_of(state, conversation_id))
}

pub fn post_message(
    state: &AppState,
    conversation_id: Uuid,
    user_id: Uuid,
    req: PostMessageRequest,
    now: DateTime<Utc>,
) -> Result<Message, AppError> {
    let conversation = participant_conversation(state, conversation_id, user_id)?;
    if !conversation.is_active {
        return Err(AppError::Conflict("conversation is closed".to_string()));
    }

    let content = req.content.trim().to_string();
    let mut errors = FieldErrors::new();
    errors.check(!content.is_empty(), "content", "message must not be empty");
    errors.check(
        content.chars().count() <= MAX_MESSAGE_LEN,
        "content",
        "message must be at most 2000 characters",
    );
    errors.check(
        req.message_type != MessageType::System,
        "message_type",
        "system messages cannot be posted",
    );
    errors.into_result()?;

    let message = Message {
        id: Uuid::new_v4(),
        conversation_id,
        author_id: Some(user_id),
        message_type: req.message_type,
        content,
        metadata: req.metadata,
        is_read: false,
        read_at: None,
        created_at: now,
    };
    state.messages.insert(message.id, message.clone());
    if let Some(mut stored) = state.conversations.get_mut(&conversation_id) {
        stored.last_message_at = Some(now);
    }
    Ok(message)
}

pub fn unread_count(state: &AppState, user_id: Uuid) -> usize {
    let conversation_ids: Vec<Uuid> = state
        .conversations
        .iter()
        .filter(|c| c.is_participant(user_id))
        .map(|c| c.id)
        .collect();
    state
        .messages
        .iter()
        .filter(|m| conversation_ids.contains(&m.conversation_id) && m.is_unread_for(user_id))
        .count()
}
