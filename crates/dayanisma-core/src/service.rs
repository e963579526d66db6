use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dayanisma_types::api::{ConversationSummary, ThreadItem};
use dayanisma_types::events::ChatEvent;
use dayanisma_types::models::Message;

use crate::attachment::AttachmentPolicy;
use crate::compose::Composer;
use crate::config::ChatConfig;
use crate::directory::UserDirectory;
use crate::error::{ChatError, StoreError, ValidationError};
use crate::labels::Labels;
use crate::message::validate_new_message;
use crate::notify::message_notifications;
use crate::reactions::ReactionChange;
use crate::store::{FileUploader, MessageCursor, MessageStore};
use crate::summary::SummaryBuilder;
use crate::thread::ThreadRenderer;
use crate::timeline::Timeline;

const REACTION_BATCH: usize = 200;

/// Wires drafts, the local timeline and the store together. Each command
/// is applied locally first and reconciled with the store's answer.
pub struct ChatService<S, U> {
    store: S,
    uploader: U,
    config: ChatConfig,
    labels: Labels,
}

impl<S: MessageStore, U: FileUploader> ChatService<S, U> {
    pub fn new(store: S, uploader: U, config: ChatConfig) -> Self {
        let labels = Labels::for_locale(config.locale);
        Self {
            store,
            uploader,
            config,
            labels,
        }
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn composer(&self, conversation_id: Uuid) -> Composer {
        Composer::new(conversation_id, AttachmentPolicy::messaging(&self.config))
    }

    /// Fetch a conversation, all its messages and their reactions.
    pub fn load_timeline(&self, conversation_id: Uuid) -> Result<Timeline, ChatError> {
        let state = self.store.load_conversation(conversation_id).map_err(store_error)?;
        let mut timeline = Timeline::new(state, self.config.emoji_policy.clone());

        for msg in MessageCursor::new(&self.store, conversation_id, crate::store::DEFAULT_PAGE_SIZE) {
            timeline.insert(msg.map_err(store_error)?)?;
        }

        let ids: Vec<Uuid> = timeline.messages().map(|m| m.id).collect();
        for chunk in ids.chunks(REACTION_BATCH) {
            for r in self.store.list_reactions(chunk).map_err(store_error)? {
                timeline.apply(ChatEvent::ReactionAdd {
                    conversation_id,
                    message_id: r.message_id,
                    user_id: r.user_id,
                    emoji: r.emoji,
                    created_at: r.created_at,
                })?;
            }
        }

        Ok(timeline)
    }

    /// Send the composer's draft. `Ok(None)` means there was nothing to send.
    /// On any failure the draft is left as it was so the user can retry.
    pub fn send_draft<D: UserDirectory + ?Sized>(
        &self,
        composer: &mut Composer,
        sender: Uuid,
        timeline: &mut Timeline,
        directory: &D,
    ) -> Result<Option<Message>, ChatError> {
        if composer.conversation_id() != timeline.conversation_id() {
            return Err(ValidationError::WrongConversation(composer.conversation_id()).into());
        }

        if let Some(attachment) = composer.attachment().filter(|a| a.uploaded.is_none()) {
            let file = self.uploader.upload(&attachment.file)?;
            debug!(name = %file.name, url = %file.url, "attachment uploaded");
            composer.record_upload(file);
        }

        let outcome = composer.send(|payload| -> Result<Message, ChatError> {
            let file = payload.attachment.as_ref().and_then(|a| a.uploaded.clone());
            let new = payload.into_new_message(sender, file);
            validate_new_message(&new)?;

            let (pending, _) = timeline.send_optimistic(new.clone(), Utc::now())?;
            match self.store.insert_message(&new) {
                Ok(stored) => {
                    timeline.confirm_send(pending, stored.clone())?;
                    Ok(stored)
                }
                Err(e) => {
                    timeline.reject(pending)?;
                    Err(store_error(e))
                }
            }
        });

        let stored = match outcome {
            None => return Ok(None),
            Some(result) => result?,
        };
        info!(conversation = %stored.conversation_id, message = %stored.id, kind = ?stored.kind, "message sent");

        let replied_to = stored.reply_to.and_then(|id| timeline.get(id));
        let notifications = message_notifications(
            timeline.participants(),
            &stored,
            replied_to,
            directory,
            &self.labels,
            self.config.preview_chars,
        );
        if let Err(e) = self.store.insert_notifications(&notifications) {
            // the message itself is stored; a missed notification is not worth failing the send
            warn!(message = %stored.id, error = %e, "failed to store notifications");
        }

        Ok(Some(stored))
    }

    pub fn toggle_reaction(
        &self,
        timeline: &mut Timeline,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<ReactionChange, ChatError> {
        let (pending, _) = timeline.toggle_reaction_optimistic(message_id, user_id, emoji, Utc::now())?;
        match self.store.toggle_reaction(message_id, user_id, emoji) {
            Ok(stored) => {
                timeline.confirm_reaction(pending, stored, Utc::now())?;
                Ok(stored)
            }
            Err(e) => {
                timeline.reject(pending)?;
                Err(store_error(e))
            }
        }
    }

    pub fn edit_message(&self, timeline: &mut Timeline, message_id: Uuid, actor: Uuid, content: &str) -> Result<Message, ChatError> {
        timeline.check_edit(message_id, actor, content)?;
        let stored = self
            .store
            .edit_message(message_id, content.trim(), Utc::now())
            .map_err(store_error)?;
        timeline.insert(stored.clone())?;
        Ok(stored)
    }

    pub fn delete_message(&self, timeline: &mut Timeline, message_id: Uuid, actor: Uuid) -> Result<Message, ChatError> {
        timeline.check_owned_live(message_id, actor, "delete")?;
        let stored = self
            .store
            .soft_delete_message(message_id, Utc::now())
            .map_err(store_error)?;
        timeline.insert(stored.clone())?;
        Ok(stored)
    }

    /// Mark everything loaded in the timeline as read by `user_id`.
    pub fn mark_read(&self, timeline: &mut Timeline, user_id: Uuid) -> Result<(), ChatError> {
        let Some(upto) = timeline.last_message().map(|m| m.created_at) else {
            return Ok(());
        };
        self.store
            .mark_read(timeline.conversation_id(), user_id, upto)
            .map_err(store_error)?;
        timeline.mark_read(user_id, upto);
        Ok(())
    }

    pub fn render_thread<D: UserDirectory + ?Sized>(&self, timeline: &Timeline, viewer: Uuid, directory: &D) -> Vec<ThreadItem> {
        let messages: Vec<Message> = timeline.messages().cloned().collect();
        ThreadRenderer::new(viewer, directory, &self.labels, self.config.preview_chars).render(
            &messages,
            timeline.participants(),
            &timeline.reaction_rows(),
        )
    }

    pub fn summaries<D: UserDirectory + ?Sized>(&self, viewer: Uuid, directory: &D) -> Result<Vec<ConversationSummary>, ChatError> {
        let records = self.store.list_conversations(viewer).map_err(store_error)?;
        let builder = SummaryBuilder {
            viewer,
            directory,
            labels: &self.labels,
            preview_chars: self.config.preview_chars,
            badge_cap: self.config.unread_badge_cap,
        };
        Ok(builder.build_all(&records))
    }
}

/// Referential failures surface as `NotFound`; everything else as a store error.
fn store_error(e: StoreError) -> ChatError {
    match e {
        StoreError::NotFound(id) => ChatError::NotFound(id),
        other => ChatError::Store(other),
    }
}
