use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dayanisma_types::api::ConversationRecord;
use dayanisma_types::models::{FileRef, Message, NewMessage, Notification, Reaction};

use crate::attachment::OutgoingFile;
use crate::conversation::ConversationState;
use crate::error::StoreError;
use crate::reactions::ReactionChange;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Position just after a message in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl From<&Message> for Cursor {
    fn from(m: &Message) -> Self {
        Self {
            created_at: m.created_at,
            id: m.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Start after this position; `None` starts from the oldest message.
    pub after: Option<Cursor>,
    pub limit: u32,
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self {
            after: None,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn after(cursor: Cursor, limit: u32) -> Self {
        Self {
            after: Some(cursor),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    /// `created_at` ascending, ties by id.
    pub messages: Vec<Message>,
    /// Where to resume; `None` once the end was reached.
    pub next: Option<Cursor>,
}

/// The persistence collaborator. Implementations decide how data is kept;
/// the core only relies on these outcomes.
pub trait MessageStore {
    fn create_conversation(&self, state: &ConversationState) -> Result<(), StoreError>;

    /// Validates, assigns id and timestamps, and bumps the conversation's
    /// `last_message_at`.
    fn insert_message(&self, new: &NewMessage) -> Result<Message, StoreError>;

    fn list_messages(&self, conversation_id: Uuid, page: &PageRequest) -> Result<MessagePage, StoreError>;

    fn edit_message(&self, message_id: Uuid, content: &str, at: DateTime<Utc>) -> Result<Message, StoreError>;

    fn soft_delete_message(&self, message_id: Uuid, at: DateTime<Utc>) -> Result<Message, StoreError>;

    /// `NotFound` if the message does not exist.
    fn toggle_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<ReactionChange, StoreError>;

    fn list_reactions(&self, message_ids: &[Uuid]) -> Result<Vec<Reaction>, StoreError>;

    /// Moves the participant's read cursor forward to `upto`; never backwards.
    fn mark_read(&self, conversation_id: Uuid, user_id: Uuid, upto: DateTime<Utc>) -> Result<(), StoreError>;

    fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationRecord>, StoreError>;

    fn load_conversation(&self, conversation_id: Uuid) -> Result<ConversationState, StoreError>;

    fn insert_notifications(&self, notifications: &[Notification]) -> Result<(), StoreError>;
}

/// External file storage. Only sees files that already passed validation.
pub trait FileUploader {
    fn upload(&self, file: &OutgoingFile) -> Result<FileRef, StoreError>;
}

/// Lazily walks every message of a conversation page by page. Restart from
/// any point with [`MessageCursor::resume`].
pub struct MessageCursor<'a, S: MessageStore + ?Sized> {
    store: &'a S,
    conversation_id: Uuid,
    next: Option<Cursor>,
    page_size: u32,
    buffer: std::vec::IntoIter<Message>,
    done: bool,
}

impl<'a, S: MessageStore + ?Sized> MessageCursor<'a, S> {
    pub fn new(store: &'a S, conversation_id: Uuid, page_size: u32) -> Self {
        Self::resume(store, conversation_id, None, page_size)
    }

    pub fn resume(store: &'a S, conversation_id: Uuid, after: Option<Cursor>, page_size: u32) -> Self {
        Self {
            store,
            conversation_id,
            next: after,
            page_size,
            buffer: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Position after the last page fetched, usable with `resume`.
    pub fn position(&self) -> Option<Cursor> {
        self.next
    }
}

impl<S: MessageStore + ?Sized> Iterator for MessageCursor<'_, S> {
    type Item = Result<Message, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(msg) = self.buffer.next() {
                return Some(Ok(msg));
            }
            if self.done {
                return None;
            }

            let request = PageRequest {
                after: self.next,
                limit: self.page_size.clamp(1, MAX_PAGE_SIZE),
            };
            match self.store.list_messages(self.conversation_id, &request) {
                Ok(page) => {
                    if let Some(last) = page.messages.last() {
                        self.next = Some(Cursor::from(last));
                    }
                    self.done = page.next.is_none() || page.messages.is_empty();
                    self.buffer = page.messages.into_iter();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
