use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Conversation {
    pub id: Uuid,
    pub match_id: Uuid,
    pub shipment_id: Uuid,
    pub sender_id: Uuid,
    pub traveler_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.traveler_id == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Location,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// `None` for system messages.
    pub author_id: Option<Uuid>,
    pub message_type: MessageType,
    pub content: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn system(conversation_id: Uuid, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            author_id: None,
            message_type: MessageType::System,
            content: content.into(),
            metadata: serde_json::Value::Null,
            is_read: false,
            read_at: None,
            created_at: now,
        }
    }

    /// Unread for `user_id` when someone else wrote it.
    pub fn is_unread_for(&self, user_id: Uuid) -> bool {
        !self.is_read && self.author_id != Some(user_id)
    }
}
