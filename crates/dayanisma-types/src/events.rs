use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Writes arriving from the data store's real-time feed. Any of these may be
/// delivered late, out of order, or more than once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// A message was inserted by some participant
    MessageCreate { message: Message },

    /// A message's content was replaced by its sender
    MessageEdit {
        conversation_id: Uuid,
        message_id: Uuid,
        content: String,
        edited_at: DateTime<Utc>,
    },

    /// A message was soft-deleted by its sender
    MessageDelete {
        conversation_id: Uuid,
        message_id: Uuid,
        deleted_at: DateTime<Utc>,
    },

    /// A reaction row was inserted
    ReactionAdd {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
        created_at: DateTime<Utc>,
    },

    /// A reaction row was removed
    ReactionRemove {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },

    /// A participant's read cursor moved
    ReadReceipt {
        conversation_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    },
}

impl ChatEvent {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            Self::MessageCreate { message } => message.conversation_id,
            Self::MessageEdit { conversation_id, .. }
            | Self::MessageDelete { conversation_id, .. }
            | Self::ReactionAdd { conversation_id, .. }
            | Self::ReactionRemove { conversation_id, .. }
            | Self::ReadReceipt { conversation_id, .. } => *conversation_id,
        }
    }
}
