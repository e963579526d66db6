use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Conversation, ConversationKind, FileRef, Message, MessageKind, Participant};

// -- Reactions --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub reacted_by_viewer: bool,
    pub user_ids: Vec<Uuid>,
}

// -- Thread --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Sent,
    Read,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplyPreview {
    Resolved {
        message_id: Uuid,
        sender_name: String,
        preview: String,
    },
    /// Target is gone or was never loaded; rendered as a fixed label.
    Unavailable { placeholder: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageActions {
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_react: bool,
    pub can_reply: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadItem {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub is_own: bool,
    /// First message of a same-sender run shows avatar and name.
    pub show_header: bool,
    pub sender_name: Option<String>,
    pub sender_avatar: Option<String>,
    pub kind: MessageKind,
    pub body: String,
    pub file: Option<FileRef>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub reply: Option<ReplyPreview>,
    pub actions: MessageActions,
    /// Only set for the viewer's own messages.
    pub delivery: Option<Delivery>,
    pub reactions: Vec<ReactionGroup>,
    pub created_at: DateTime<Utc>,
}

// -- Conversation list --

/// What the store hands back for the conversation list: the conversation,
/// its members, and the denormalized newest message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub conversation: Conversation,
    pub participants: Vec<Participant>,
    pub last_message: Option<Message>,
    pub unread_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub kind: ConversationKind,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub last_message_preview: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: usize,
    /// `None` when there is nothing unread, otherwise the capped label ("7", "99+").
    pub unread_badge: Option<String>,
    pub is_online: bool,
    pub is_muted: bool,
    pub is_archived: bool,
}
