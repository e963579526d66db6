use uuid::Uuid;

use dayanisma_types::api::{ConversationRecord, ConversationSummary};
use dayanisma_types::models::{
    Conversation, ConversationKind, Message, MessageKind, Participant, Presence, User,
};

use crate::directory::UserDirectory;
use crate::labels::{LabelKey, Labels};
use crate::message::unread_count;
use crate::preview::{truncate_preview, unread_badge};

/// Build a list record from a full message history, for callers that hold
/// messages in memory rather than asking the store for the denormalized form.
pub fn record_from_messages(
    conversation: Conversation,
    participants: Vec<Participant>,
    messages: &[Message],
    viewer: Uuid,
) -> ConversationRecord {
    let last_message = messages.iter().max_by_key(|m| m.sort_key()).cloned();
    let unread_count = participants
        .iter()
        .find(|p| p.user_id == viewer)
        .map(|p| unread_count(messages, p))
        .unwrap_or(0);

    ConversationRecord {
        conversation,
        participants,
        last_message,
        unread_count,
    }
}

pub struct SummaryBuilder<'a, D: UserDirectory + ?Sized> {
    pub viewer: Uuid,
    pub directory: &'a D,
    pub labels: &'a Labels,
    pub preview_chars: usize,
    pub badge_cap: usize,
}

impl<'a, D: UserDirectory + ?Sized> SummaryBuilder<'a, D> {
    pub fn build(&self, record: &ConversationRecord) -> ConversationSummary {
        let conversation = &record.conversation;
        let other = match conversation.kind {
            ConversationKind::Direct => self.other_user(&record.participants),
            ConversationKind::Group => None,
        };

        let display_name = match conversation.kind {
            ConversationKind::Direct => other
                .as_ref()
                .map(|u| u.display_name.clone())
                .unwrap_or_else(|| self.labels.get(LabelKey::UnknownUser).to_string()),
            ConversationKind::Group => conversation
                .name
                .clone()
                .unwrap_or_else(|| self.labels.get(LabelKey::GroupChat).to_string()),
        };

        let avatar_url = match conversation.kind {
            ConversationKind::Direct => other.as_ref().and_then(|u| u.avatar_url.clone()),
            ConversationKind::Group => conversation.avatar_url.clone(),
        };

        let is_muted = record
            .participants
            .iter()
            .find(|p| p.user_id == self.viewer)
            .is_some_and(|p| p.is_muted);

        ConversationSummary {
            conversation_id: conversation.id,
            kind: conversation.kind,
            display_name,
            avatar_url,
            last_message_preview: self.last_message_preview(conversation.kind, record.last_message.as_ref()),
            last_message_at: conversation
                .last_message_at
                .or_else(|| record.last_message.as_ref().map(|m| m.created_at)),
            unread_count: record.unread_count,
            unread_badge: unread_badge(record.unread_count, self.badge_cap),
            is_online: other.is_some_and(|u| u.presence == Presence::Online),
            is_muted,
            is_archived: conversation.is_archived,
        }
    }

    /// Newest first by last activity, falling back to creation time.
    pub fn build_all(&self, records: &[ConversationRecord]) -> Vec<ConversationSummary> {
        let mut ordered: Vec<&ConversationRecord> = records.iter().collect();
        ordered.sort_by_key(|r| {
            std::cmp::Reverse(r.conversation.last_message_at.unwrap_or(r.conversation.created_at))
        });
        ordered.into_iter().map(|r| self.build(r)).collect()
    }

    fn other_user(&self, participants: &[Participant]) -> Option<User> {
        participants
            .iter()
            .find(|p| p.user_id != self.viewer)
            .and_then(|p| self.directory.lookup(p.user_id))
    }

    fn last_message_preview(&self, kind: ConversationKind, last: Option<&Message>) -> String {
        let Some(msg) = last else {
            return self.labels.get(LabelKey::NoMessages).to_string();
        };

        let sender = if msg.sender_id == self.viewer {
            self.labels.get(LabelKey::You).to_string()
        } else {
            self.directory
                .lookup(msg.sender_id)
                .map(|u| u.display_name)
                .unwrap_or_else(|| self.labels.get(LabelKey::UnknownUser).to_string())
        };

        let body = if msg.is_deleted() {
            self.labels.get(LabelKey::MessageDeleted).to_string()
        } else {
            match msg.kind {
                // already carries the sender name
                MessageKind::File => return self.labels.render(LabelKey::SentFile, &sender),
                MessageKind::Image => return self.labels.render(LabelKey::SentImage, &sender),
                MessageKind::Text | MessageKind::System => truncate_preview(&msg.content, self.preview_chars),
            }
        };

        match kind {
            ConversationKind::Group => format!("{sender}: {body}"),
            ConversationKind::Direct => body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use dayanisma_types::models::FileRef;

    use crate::conversation::ConversationState;
    use crate::labels::Locale;

    fn user(name: &str, presence: Presence) -> User {
        User {
            id: Uuid::new_v4(),
            display_name: name.into(),
            avatar_url: Some(format!("https://avatars.example/{name}")),
            presence,
        }
    }

    fn message(conv: Uuid, sender: Uuid, kind: MessageKind, content: &str, offset: i64) -> Message {
        let at = Utc::now() + Duration::seconds(offset);
        Message {
            id: Uuid::new_v4(),
            conversation_id: conv,
            sender_id: sender,
            content: content.into(),
            kind,
            file: kind.carries_file().then(|| FileRef {
                url: "https://files.example/x".into(),
                name: "x".into(),
                size: 1,
            }),
            reply_to: None,
            edited_at: None,
            deleted_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn builder<'a>(viewer: Uuid, users: &'a Vec<User>, labels: &'a Labels) -> SummaryBuilder<'a, Vec<User>> {
        SummaryBuilder {
            viewer,
            directory: users,
            labels,
            preview_chars: 50,
            badge_cap: 99,
        }
    }

    #[test]
    fn direct_hello_scenario() {
        let a = user("Ayşe", Presence::Online);
        let b = user("Burak", Presence::Away);
        let users = vec![a.clone(), b.clone()];
        let labels = Labels::for_locale(Locale::En);
        let state = ConversationState::direct(a.id, b.id, Utc::now()).unwrap();
        let hello = message(state.id(), a.id, MessageKind::Text, "Hello", 1);

        let record = record_from_messages(state.conversation, state.participants, &[hello], b.id);
        let summary = builder(b.id, &users, &labels).build(&record);

        assert_eq!(summary.display_name, "Ayşe");
        assert_eq!(summary.last_message_preview, "Hello");
        assert_eq!(summary.unread_count, 1);
        assert_eq!(summary.unread_badge.as_deref(), Some("1"));
        assert!(summary.is_online);
        assert_eq!(summary.avatar_url.as_deref(), Some("https://avatars.example/Ayşe"));

        // and from the sender's side
        let summary = builder(a.id, &users, &labels).build(&ConversationRecord {
            unread_count: 0,
            ..record
        });
        assert_eq!(summary.display_name, "Burak");
        assert!(!summary.is_online);
        assert_eq!(summary.unread_badge, None);
    }

    #[test]
    fn direct_ignores_stored_name_and_falls_back() {
        let viewer = user("Ayşe", Presence::Online);
        let users = vec![viewer.clone()];
        let labels = Labels::for_locale(Locale::Tr);
        let mut state = ConversationState::direct(viewer.id, Uuid::new_v4(), Utc::now()).unwrap();
        state.conversation.name = Some("eski ad".into());

        let record = record_from_messages(state.conversation, state.participants, &[], viewer.id);
        let summary = builder(viewer.id, &users, &labels).build(&record);
        assert_eq!(summary.display_name, "Bilinmeyen kullanıcı");
        assert_eq!(summary.last_message_preview, "Henüz mesaj yok");
    }

    #[test]
    fn group_previews_carry_sender() {
        let me = user("Ayşe", Presence::Online);
        let other = user("Can", Presence::Online);
        let users = vec![me.clone(), other.clone()];
        let labels = Labels::for_locale(Locale::En);
        let state = ConversationState::group(me.id, None, &[other.id], Utc::now()).unwrap();
        let conv = state.id();
        let b = builder(me.id, &users, &labels);

        let record = |msgs: &[Message]| record_from_messages(state.conversation.clone(), state.participants.clone(), msgs, me.id);

        let s = b.build(&record(&[message(conv, other.id, MessageKind::Text, "Toplantı 3'te", 1)]));
        assert_eq!(s.display_name, "Group chat");
        assert_eq!(s.last_message_preview, "Can: Toplantı 3'te");
        assert!(!s.is_online);

        let s = b.build(&record(&[message(conv, me.id, MessageKind::Image, "", 1)]));
        assert_eq!(s.last_message_preview, "You sent an image");

        let s = b.build(&record(&[message(conv, other.id, MessageKind::File, "", 1)]));
        assert_eq!(s.last_message_preview, "Can sent a file");

        let s = b.build(&record(&[message(conv, other.id, MessageKind::System, "Can joined", 1)]));
        assert_eq!(s.last_message_preview, "Can: Can joined");
    }

    #[test]
    fn direct_file_preview_uses_you_for_self() {
        let me = user("Ayşe", Presence::Online);
        let other = user("Can", Presence::Offline);
        let users = vec![me.clone(), other.clone()];
        let labels = Labels::for_locale(Locale::En);
        let state = ConversationState::direct(me.id, other.id, Utc::now()).unwrap();
        let msg = message(state.id(), me.id, MessageKind::File, "", 1);
        let record = record_from_messages(state.conversation, state.participants, &[msg], me.id);
        assert_eq!(builder(me.id, &users, &labels).build(&record).last_message_preview, "You sent a file");
    }

    #[test]
    fn long_text_is_truncated_and_badge_capped() {
        let me = user("Ayşe", Presence::Online);
        let other = user("Can", Presence::Online);
        let users = vec![me.clone(), other.clone()];
        let labels = Labels::for_locale(Locale::En);
        let state = ConversationState::direct(me.id, other.id, Utc::now()).unwrap();

        let msgs: Vec<Message> = (0..120)
            .map(|i| message(state.id(), other.id, MessageKind::Text, &"y".repeat(80), i))
            .collect();
        let record = record_from_messages(state.conversation, state.participants, &msgs, me.id);
        let s = builder(me.id, &users, &labels).build(&record);

        assert_eq!(s.unread_count, 120);
        assert_eq!(s.unread_badge.as_deref(), Some("99+"));
        assert_eq!(s.last_message_preview, format!("{}...", "y".repeat(50)));
    }

    #[test]
    fn muted_and_archived_pass_through() {
        let me = user("Ayşe", Presence::Online);
        let users = vec![me.clone()];
        let labels = Labels::default();
        let mut state = ConversationState::group(me.id, Some("Depo".into()), &[Uuid::new_v4()], Utc::now()).unwrap();
        state.set_muted(me.id, true);
        state.set_archived(true, Utc::now());

        let record = record_from_messages(state.conversation, state.participants, &[], me.id);
        let s = builder(me.id, &users, &labels).build(&record);
        assert_eq!(s.display_name, "Depo");
        assert!(s.is_muted);
        assert!(s.is_archived);
    }
}
