use chrono::{DateTime, Utc};
use uuid::Uuid;

use dayanisma_types::models::{Message, MessageKind, NewMessage, Participant};

use crate::error::ValidationError;

/// Check the shape rules a message must satisfy before it may be stored.
pub fn validate_new_message(msg: &NewMessage) -> Result<(), ValidationError> {
    if msg.kind.carries_file() && msg.file.is_none() {
        return Err(ValidationError::MissingFile(msg.kind));
    }
    if matches!(msg.kind, MessageKind::Text | MessageKind::System) && msg.content.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    Ok(())
}

/// Build the stored form of a validated payload.
pub fn materialize(msg: NewMessage, id: Uuid, at: DateTime<Utc>) -> Message {
    Message {
        id,
        conversation_id: msg.conversation_id,
        sender_id: msg.sender_id,
        content: msg.content,
        kind: msg.kind,
        file: msg.file,
        reply_to: msg.reply_to,
        edited_at: None,
        deleted_at: None,
        created_at: at,
        updated_at: at,
    }
}

/// Sort into display order: `created_at` ascending, then id.
pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by_key(Message::sort_key);
}

/// Messages from others created after the participant's read cursor.
pub fn unread_count<'a, I>(messages: I, participant: &Participant) -> usize
where
    I: IntoIterator<Item = &'a Message>,
{
    messages
        .into_iter()
        .filter(|m| m.sender_id != participant.user_id)
        .filter(|m| match participant.last_read_at {
            Some(read) => m.created_at > read,
            None => true,
        })
        .count()
}
