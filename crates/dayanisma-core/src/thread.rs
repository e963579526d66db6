use std::collections::HashMap;

use uuid::Uuid;

use dayanisma_types::api::{Delivery, MessageActions, ReplyPreview, ThreadItem};
use dayanisma_types::models::{Message, MessageKind, Participant, Reaction};

use crate::directory::UserDirectory;
use crate::labels::{LabelKey, Labels};
use crate::preview::truncate_preview;
use crate::reactions::aggregate;

/// Turns a conversation's messages into display rows for one viewer.
pub struct ThreadRenderer<'a, D: UserDirectory + ?Sized> {
    pub viewer: Uuid,
    pub directory: &'a D,
    pub labels: &'a Labels,
    pub preview_chars: usize,
}

impl<'a, D: UserDirectory + ?Sized> ThreadRenderer<'a, D> {
    pub fn new(viewer: Uuid, directory: &'a D, labels: &'a Labels, preview_chars: usize) -> Self {
        Self {
            viewer,
            directory,
            labels,
            preview_chars,
        }
    }

    /// Input order does not matter; output is always `created_at` ascending.
    /// `participants` supply the read cursors behind the sent/read marker.
    pub fn render(&self, messages: &[Message], participants: &[Participant], reactions: &[Reaction]) -> Vec<ThreadItem> {
        let mut ordered: Vec<&Message> = messages.iter().collect();
        ordered.sort_by_key(|m| m.sort_key());

        let by_id: HashMap<Uuid, &Message> = ordered.iter().map(|m| (m.id, *m)).collect();

        let mut reactions_by_message: HashMap<Uuid, Vec<Reaction>> = HashMap::new();
        for r in reactions {
            reactions_by_message.entry(r.message_id).or_default().push(r.clone());
        }

        let readers: Vec<&Participant> = participants
            .iter()
            .filter(|p| p.is_active() && p.user_id != self.viewer)
            .collect();

        let mut names: HashMap<Uuid, (String, Option<String>)> = HashMap::new();
        let mut previous_sender: Option<Uuid> = None;
        let mut items = Vec::with_capacity(ordered.len());

        for msg in ordered {
            let is_own = msg.sender_id == self.viewer;
            let is_system = msg.kind == MessageKind::System;
            let show_header = !is_system && previous_sender != Some(msg.sender_id);
            previous_sender = if is_system { None } else { Some(msg.sender_id) };

            let (sender_name, sender_avatar) = if show_header {
                let (name, avatar) = self.sender(&mut names, msg.sender_id);
                (Some(name), avatar)
            } else {
                (None, None)
            };

            let is_deleted = msg.is_deleted();
            let (body, file) = if is_deleted {
                (self.labels.get(LabelKey::MessageDeleted).to_string(), None)
            } else {
                (msg.content.clone(), msg.file.clone())
            };

            let reply = msg.reply_to.map(|target| self.reply_preview(&by_id, &mut names, target));

            let actions = if is_deleted {
                MessageActions::default()
            } else {
                MessageActions {
                    can_edit: is_own && !is_system,
                    can_delete: is_own && !is_system,
                    can_react: true,
                    can_reply: true,
                }
            };

            let delivery = is_own.then(|| {
                if !readers.is_empty() && readers.iter().all(|p| p.has_read(msg.created_at)) {
                    Delivery::Read
                } else {
                    Delivery::Sent
                }
            });

            let reactions = reactions_by_message
                .get(&msg.id)
                .map(|rows| aggregate(rows, self.viewer))
                .unwrap_or_default();

            items.push(ThreadItem {
                message_id: msg.id,
                sender_id: msg.sender_id,
                is_own,
                show_header,
                sender_name,
                sender_avatar,
                kind: msg.kind,
                body,
                file,
                is_edited: msg.edited_at.is_some(),
                is_deleted,
                reply,
                actions,
                delivery,
                reactions,
                created_at: msg.created_at,
            });
        }

        items
    }

    fn reply_preview(
        &self,
        by_id: &HashMap<Uuid, &Message>,
        names: &mut HashMap<Uuid, (String, Option<String>)>,
        target: Uuid,
    ) -> ReplyPreview {
        match by_id.get(&target) {
            Some(original) if !original.is_deleted() => {
                let text = match (&original.file, original.content.trim().is_empty()) {
                    (Some(file), true) => file.name.as_str(),
                    _ => original.content.as_str(),
                };
                ReplyPreview::Resolved {
                    message_id: original.id,
                    sender_name: self.sender(names, original.sender_id).0,
                    preview: truncate_preview(text, self.preview_chars),
                }
            }
            _ => ReplyPreview::Unavailable {
                placeholder: self.labels.get(LabelKey::ReplyUnavailable).to_string(),
            },
        }
    }

    fn sender(&self, cache: &mut HashMap<Uuid, (String, Option<String>)>, id: Uuid) -> (String, Option<String>) {
        cache
            .entry(id)
            .or_insert_with(|| match self.directory.lookup(id) {
                Some(user) => (user.display_name, user.avatar_url),
                None => (self.labels.get(LabelKey::UnknownUser).to_string(), None),
            })
            .clone()
    }
}
