use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use dayanisma_core::StoreError;
use dayanisma_core::conversation::ConversationState;
use dayanisma_core::directory::UserDirectory;
use dayanisma_core::reactions::ReactionChange;
use dayanisma_core::store::{MessagePage, MessageStore, PageRequest};
use dayanisma_types::api::ConversationRecord;
use dayanisma_types::models::{Message, NewMessage, Notification, Reaction, User};

use crate::Database;

/// Typed store errors travel through anyhow unchanged; anything else
/// (SQLite, corrupt rows, a poisoned lock) means the store is unusable.
fn store_error(e: anyhow::Error) -> StoreError {
    match e.downcast::<StoreError>() {
        Ok(typed) => typed,
        Err(other) => {
            warn!(error = %other, "store failure");
            StoreError::Unavailable(other.to_string())
        }
    }
}

impl MessageStore for Database {
    fn create_conversation(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.insert_conversation(state).map_err(store_error)?;
        debug!(conversation = %state.id(), kind = ?state.kind(), "conversation created");
        Ok(())
    }

    fn insert_message(&self, new: &NewMessage) -> Result<Message, StoreError> {
        self.append_message(new).map_err(store_error)
    }

    fn list_messages(&self, conversation_id: Uuid, page: &PageRequest) -> Result<MessagePage, StoreError> {
        self.get_messages(conversation_id, page).map_err(store_error)
    }

    fn edit_message(&self, message_id: Uuid, content: &str, at: DateTime<Utc>) -> Result<Message, StoreError> {
        self.update_message_content(message_id, content, at).map_err(store_error)
    }

    fn soft_delete_message(&self, message_id: Uuid, at: DateTime<Utc>) -> Result<Message, StoreError> {
        self.mark_message_deleted(message_id, at).map_err(store_error)
    }

    fn toggle_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<ReactionChange, StoreError> {
        self.toggle_message_reaction(message_id, user_id, emoji).map_err(store_error)
    }

    fn list_reactions(&self, message_ids: &[Uuid]) -> Result<Vec<Reaction>, StoreError> {
        self.get_reactions_for_messages(message_ids).map_err(store_error)
    }

    fn mark_read(&self, conversation_id: Uuid, user_id: Uuid, upto: DateTime<Utc>) -> Result<(), StoreError> {
        let moved = self
            .advance_read_cursor(conversation_id, user_id, upto)
            .map_err(store_error)?;
        if !moved {
            debug!(conversation = %conversation_id, user = %user_id, "read cursor already past {}", upto);
        }
        Ok(())
    }

    fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationRecord>, StoreError> {
        self.conversation_records(user_id).map_err(store_error)
    }

    fn load_conversation(&self, conversation_id: Uuid) -> Result<ConversationState, StoreError> {
        self.get_conversation(conversation_id)
            .map_err(store_error)?
            .ok_or(StoreError::NotFound(conversation_id))
    }

    fn insert_notifications(&self, notifications: &[Notification]) -> Result<(), StoreError> {
        self.store_notifications(notifications).map_err(store_error)
    }
}

impl UserDirectory for Database {
    fn lookup(&self, id: Uuid) -> Option<User> {
        match self.get_user_by_id(id) {
            Ok(user) => user,
            Err(e) => {
                warn!(user = %id, error = %e, "user lookup failed");
                None
            }
        }
    }
}
