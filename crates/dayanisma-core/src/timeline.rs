use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use dayanisma_types::api::{ConversationRecord, ReactionGroup};
use dayanisma_types::events::ChatEvent;
use dayanisma_types::models::{Message, MessageKind, NewMessage, Participant, Reaction};

use crate::config::EmojiPolicy;
use crate::conversation::ConversationState;
use crate::error::{ChatError, ValidationError};
use crate::message::{materialize, unread_count, validate_new_message};
use crate::reactions::{ReactionChange, ReactionSet};

type SortKey = (DateTime<Utc>, Uuid);

/// Handle for a write applied locally before the store confirmed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingId(Uuid);

#[derive(Debug, Clone)]
enum PendingWrite {
    Send {
        temp_id: Uuid,
        previous_last_message_at: Option<DateTime<Utc>>,
    },
    Reaction {
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
        change: ReactionChange,
    },
}

/// In-memory copy of one conversation: membership, ordered messages,
/// reactions and read cursors. Local commands and feed events both land
/// here; every mutation is either a monotonic append or an idempotent toggle.
#[derive(Debug, Clone)]
pub struct Timeline {
    state: ConversationState,
    messages: BTreeMap<SortKey, Message>,
    index: HashMap<Uuid, SortKey>,
    reactions: HashMap<Uuid, ReactionSet>,
    pending: HashMap<PendingId, PendingWrite>,
    emoji_policy: EmojiPolicy,
}

impl Timeline {
    pub fn new(state: ConversationState, emoji_policy: EmojiPolicy) -> Self {
        Self {
            state,
            messages: BTreeMap::new(),
            index: HashMap::new(),
            reactions: HashMap::new(),
            pending: HashMap::new(),
            emoji_policy,
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.state.id()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ConversationState {
        &mut self.state
    }

    pub fn participants(&self) -> &[Participant] {
        &self.state.participants
    }

    // -- Messages --

    /// Insert at the correct position by `(created_at, id)`. Re-inserting a
    /// known id replaces it only if the copy is at least as fresh. Returns
    /// true if the message was new.
    pub fn insert(&mut self, message: Message) -> Result<bool, ValidationError> {
        if message.conversation_id != self.conversation_id() {
            return Err(ValidationError::WrongConversation(message.conversation_id));
        }

        let key = message.sort_key();
        let is_new = match self.index.get(&message.id).copied() {
            Some(old_key) => {
                let stale = self
                    .messages
                    .get(&old_key)
                    .is_some_and(|existing| existing.updated_at > message.updated_at);
                if stale {
                    return Ok(false);
                }
                self.messages.remove(&old_key);
                false
            }
            None => true,
        };

        let conversation = &mut self.state.conversation;
        if conversation.last_message_at.is_none_or(|at| at < message.created_at) {
            conversation.last_message_at = Some(message.created_at);
        }

        if message.is_deleted() {
            self.reactions.remove(&message.id);
        }
        self.index.insert(message.id, key);
        self.messages.insert(key, message);
        Ok(is_new)
    }

    pub fn extend<I: IntoIterator<Item = Message>>(&mut self, messages: I) -> Result<usize, ValidationError> {
        let mut added = 0;
        for message in messages {
            if self.insert(message)? {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.index.get(&id).and_then(|key| self.messages.get(key))
    }

    /// Display order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.values().next_back()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Only the sender may change a message, and only while it is live.
    pub fn check_owned_live(&self, id: Uuid, actor: Uuid, action: &'static str) -> Result<&Message, ChatError> {
        let msg = self
            .get(id)
            .filter(|m| !m.is_deleted())
            .ok_or(ChatError::NotFound(id))?;
        if msg.sender_id != actor {
            return Err(ChatError::NotOwner {
                user: actor,
                message: id,
                action,
            });
        }
        Ok(msg)
    }

    /// Text messages cannot be edited down to nothing.
    pub fn check_edit(&self, id: Uuid, actor: Uuid, content: &str) -> Result<(), ChatError> {
        let msg = self.check_owned_live(id, actor, "edit")?;
        if msg.kind == MessageKind::Text && content.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        Ok(())
    }

    fn message_mut(&mut self, id: Uuid) -> Option<&mut Message> {
        let key = self.index.get(&id)?;
        self.messages.get_mut(key)
    }

    fn discard_temp(&mut self, temp_id: Uuid, previous_last_message_at: Option<DateTime<Utc>>) {
        if let Some(key) = self.index.remove(&temp_id) {
            self.messages.remove(&key);
            self.reactions.remove(&temp_id);
        }
        // a feed message may have landed while the send was in flight
        let loaded = self.last_message().map(|m| m.created_at);
        self.state.conversation.last_message_at = previous_last_message_at.max(loaded);
    }

    // -- Reactions --

    pub fn add_reaction(&mut self, message_id: Uuid, user_id: Uuid, emoji: &str, at: DateTime<Utc>) -> Result<bool, ChatError> {
        self.check_reactable(message_id, emoji)?;
        Ok(self.reaction_set(message_id).add(user_id, emoji, at))
    }

    pub fn remove_reaction(&mut self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<bool, ChatError> {
        if self.get(message_id).is_none() {
            return Err(ChatError::NotFound(message_id));
        }
        Ok(self
            .reactions
            .get_mut(&message_id)
            .is_some_and(|set| set.remove(user_id, emoji)))
    }

    /// Remove the viewer's reaction if present, add it otherwise. A missing
    /// message is reported and leaves state untouched.
    pub fn toggle_reaction(&mut self, message_id: Uuid, user_id: Uuid, emoji: &str, at: DateTime<Utc>) -> Result<ReactionChange, ChatError> {
        self.check_reactable(message_id, emoji)?;
        Ok(self.reaction_set(message_id).toggle(user_id, emoji, at))
    }

    pub fn reactions(&self, message_id: Uuid, viewer: Uuid) -> Vec<ReactionGroup> {
        self.reactions
            .get(&message_id)
            .map(|set| set.groups(viewer))
            .unwrap_or_default()
    }

    /// Every reaction row, for the thread renderer.
    pub fn reaction_rows(&self) -> Vec<Reaction> {
        self.messages
            .values()
            .filter_map(|m| self.reactions.get(&m.id))
            .flat_map(|set| set.rows().iter().cloned())
            .collect()
    }

    /// Deleted messages take no reactions and count as missing.
    fn check_reactable(&self, message_id: Uuid, emoji: &str) -> Result<(), ChatError> {
        if self.get(message_id).is_none_or(Message::is_deleted) {
            return Err(ChatError::NotFound(message_id));
        }
        if !self.emoji_policy.allows(emoji) {
            return Err(ValidationError::EmojiNotAllowed(emoji.to_string()).into());
        }
        Ok(())
    }

    fn reaction_set(&mut self, message_id: Uuid) -> &mut ReactionSet {
        self.reactions
            .entry(message_id)
            .or_insert_with(|| ReactionSet::new(message_id))
    }

    // -- Read state --

    /// Advance `user`'s read cursor to `upto`. Never moves backwards, so a
    /// replayed receipt changes nothing. Returns true if the cursor moved.
    pub fn mark_read(&mut self, user_id: Uuid, upto: DateTime<Utc>) -> bool {
        let Some(p) = self.state.participant_mut(user_id) else {
            debug!(conversation = %self.state.id(), user = %user_id, "read receipt for non-member ignored");
            return false;
        };
        if p.last_read_at.is_some_and(|read| read >= upto) {
            return false;
        }
        p.last_read_at = Some(upto);
        true
    }

    /// Mark everything currently loaded as read.
    pub fn mark_all_read(&mut self, user_id: Uuid) -> bool {
        match self.last_message().map(|m| m.created_at) {
            Some(at) => self.mark_read(user_id, at),
            None => false,
        }
    }

    pub fn unread_count(&self, user_id: Uuid) -> usize {
        self.state
            .participant(user_id)
            .map(|p| unread_count(self.messages.values(), p))
            .unwrap_or(0)
    }

    pub fn to_record(&self, viewer: Uuid) -> ConversationRecord {
        ConversationRecord {
            conversation: self.state.conversation.clone(),
            participants: self.state.participants.clone(),
            last_message: self.last_message().cloned(),
            unread_count: self.unread_count(viewer),
        }
    }

    // -- Feed --

    /// Apply a write from the real-time feed. Events for other conversations
    /// and events about messages not loaded here are dropped.
    pub fn apply(&mut self, event: ChatEvent) -> Result<(), ChatError> {
        if event.conversation_id() != self.conversation_id() {
            warn!(
                expected = %self.conversation_id(),
                got = %event.conversation_id(),
                "event routed to wrong timeline"
            );
            return Ok(());
        }

        match event {
            ChatEvent::MessageCreate { message } => {
                self.insert(message)?;
            }
            ChatEvent::MessageEdit {
                message_id,
                content,
                edited_at,
                ..
            } => match self.message_mut(message_id) {
                Some(msg) if !msg.is_deleted() && msg.edited_at.is_none_or(|e| e <= edited_at) => {
                    msg.content = content;
                    msg.edited_at = Some(edited_at);
                    msg.updated_at = edited_at;
                }
                Some(_) => {}
                None => debug!(message = %message_id, "edit for unloaded message ignored"),
            },
            ChatEvent::MessageDelete {
                message_id,
                deleted_at,
                ..
            } => {
                match self.message_mut(message_id) {
                    Some(msg) if !msg.is_deleted() => mark_deleted(msg, deleted_at),
                    Some(_) => {}
                    None => debug!(message = %message_id, "delete for unloaded message ignored"),
                }
                self.reactions.remove(&message_id);
            }
            ChatEvent::ReactionAdd {
                message_id,
                user_id,
                emoji,
                created_at,
                ..
            } => {
                if self.get(message_id).is_some_and(|m| !m.is_deleted()) {
                    self.reaction_set(message_id).add(user_id, &emoji, created_at);
                }
            }
            ChatEvent::ReactionRemove {
                message_id,
                user_id,
                emoji,
                ..
            } => {
                if let Some(set) = self.reactions.get_mut(&message_id) {
                    set.remove(user_id, &emoji);
                }
            }
            ChatEvent::ReadReceipt { user_id, read_at, .. } => {
                self.mark_read(user_id, read_at);
            }
        }
        Ok(())
    }

    // -- Optimistic writes --

    /// Show a message immediately under a temporary id.
    pub fn send_optimistic(&mut self, new: NewMessage, at: DateTime<Utc>) -> Result<(PendingId, Uuid), ChatError> {
        validate_new_message(&new)?;
        let previous_last_message_at = self.state.conversation.last_message_at;
        let temp_id = Uuid::new_v4();
        self.insert(materialize(new, temp_id, at))?;

        let pending = PendingId(Uuid::new_v4());
        self.pending.insert(
            pending,
            PendingWrite::Send {
                temp_id,
                previous_last_message_at,
            },
        );
        Ok((pending, temp_id))
    }

    /// Replace the temporary message with the stored one.
    pub fn confirm_send(&mut self, pending: PendingId, stored: Message) -> Result<(), ChatError> {
        match self.pending.remove(&pending) {
            Some(PendingWrite::Send {
                temp_id,
                previous_last_message_at,
            }) => {
                self.discard_temp(temp_id, previous_last_message_at);
                self.insert(stored)?;
                Ok(())
            }
            Some(other) => {
                self.pending.insert(pending, other);
                Err(ChatError::UnknownPending(pending.0))
            }
            None => Err(ChatError::UnknownPending(pending.0)),
        }
    }

    pub fn toggle_reaction_optimistic(
        &mut self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
        at: DateTime<Utc>,
    ) -> Result<(PendingId, ReactionChange), ChatError> {
        let change = self.toggle_reaction(message_id, user_id, emoji, at)?;
        let pending = PendingId(Uuid::new_v4());
        self.pending.insert(
            pending,
            PendingWrite::Reaction {
                message_id,
                user_id,
                emoji: emoji.to_string(),
                change,
            },
        );
        Ok((pending, change))
    }

    /// Align the local copy with what the store actually did, which may
    /// differ if another device toggled the same pair concurrently.
    pub fn confirm_reaction(&mut self, pending: PendingId, stored: ReactionChange, at: DateTime<Utc>) -> Result<(), ChatError> {
        match self.pending.remove(&pending) {
            Some(PendingWrite::Reaction {
                message_id,
                user_id,
                emoji,
                change,
            }) => {
                if change != stored {
                    debug!(message = %message_id, ?change, ?stored, "reaction reconciled to store result");
                }
                if let Some(set) = self.reactions.get_mut(&message_id) {
                    match stored {
                        ReactionChange::Added => {
                            set.add(user_id, &emoji, at);
                        }
                        ReactionChange::Removed => {
                            set.remove(user_id, &emoji);
                        }
                    }
                }
                Ok(())
            }
            Some(other) => {
                self.pending.insert(pending, other);
                Err(ChatError::UnknownPending(pending.0))
            }
            None => Err(ChatError::UnknownPending(pending.0)),
        }
    }

    /// Undo exactly the optimistic change behind `pending`.
    pub fn reject(&mut self, pending: PendingId) -> Result<(), ChatError> {
        let write = self
            .pending
            .remove(&pending)
            .ok_or(ChatError::UnknownPending(pending.0))?;

        warn!(conversation = %self.conversation_id(), ?write, "rolling back optimistic write");
        match write {
            PendingWrite::Send {
                temp_id,
                previous_last_message_at,
            } => self.discard_temp(temp_id, previous_last_message_at),
            PendingWrite::Reaction {
                message_id,
                user_id,
                emoji,
                change,
            } => {
                if let Some(set) = self.reactions.get_mut(&message_id) {
                    match change.inverse() {
                        ReactionChange::Added => {
                            set.add(user_id, &emoji, Utc::now());
                        }
                        ReactionChange::Removed => {
                            set.remove(user_id, &emoji);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn mark_deleted(msg: &mut Message, at: DateTime<Utc>) {
    msg.deleted_at = Some(at);
    msg.updated_at = at;
    msg.content.clear();
    msg.file = None;
}
