use uuid::Uuid;

use dayanisma_types::metadata::{MetaValue, Metadata};
use dayanisma_types::models::{Message, MessageKind, Notification, NotificationKind, Participant};

use crate::directory::UserDirectory;
use crate::labels::{LabelKey, Labels};
use crate::preview::truncate_preview;

/// One notification per active, unmuted participant other than the sender.
/// `replied_to` is the message `msg` answers, if loaded; its author gets a
/// `Reply` notification instead of a plain one.
pub fn message_notifications<D: UserDirectory + ?Sized>(
    participants: &[Participant],
    msg: &Message,
    replied_to: Option<&Message>,
    directory: &D,
    labels: &Labels,
    preview_chars: usize,
) -> Vec<Notification> {
    let sender = directory
        .lookup(msg.sender_id)
        .map(|u| u.display_name)
        .unwrap_or_else(|| labels.get(LabelKey::UnknownUser).to_string());

    let body = match msg.kind {
        MessageKind::File => labels.render(LabelKey::SentFile, &sender),
        MessageKind::Image => labels.render(LabelKey::SentImage, &sender),
        MessageKind::Text | MessageKind::System => truncate_preview(&msg.content, preview_chars),
    };
    let title = labels.render(LabelKey::NewMessageTitle, &sender);
    let reply_author = replied_to.map(|m| m.sender_id);

    participants
        .iter()
        .filter(|p| p.is_active() && !p.is_muted && p.user_id != msg.sender_id)
        .map(|p| {
            let kind = if reply_author == Some(p.user_id) {
                NotificationKind::Reply
            } else {
                NotificationKind::NewMessage
            };
            Notification {
                id: Uuid::new_v4(),
                user_id: p.user_id,
                kind,
                title: title.clone(),
                body: body.clone(),
                is_read: false,
                metadata: metadata_for(msg),
                created_at: msg.created_at,
            }
        })
        .collect()
}

fn metadata_for(msg: &Message) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("conversation_id", MetaValue::Text(msg.conversation_id.to_string()));
    meta.insert("message_id", MetaValue::Text(msg.id.to_string()));
    meta.insert("sender_id", MetaValue::Text(msg.sender_id.to_string()));
    meta.insert("sent_at", MetaValue::Timestamp(msg.created_at));
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dayanisma_types::models::{Presence, User};

    use crate::conversation::ConversationState;
    use crate::labels::Locale;

    #[test]
    fn skips_sender_muted_and_departed() {
        let sender = User {
            id: Uuid::new_v4(),
            display_name: "Zeynep".into(),
            avatar_url: None,
            presence: Presence::Online,
        };
        let (muted, left, active) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        let mut state = ConversationState::group(sender.id, None, &[muted, left, active], now).unwrap();
        state.set_muted(muted, true);
        state.remove_participant(left, now).unwrap();

        let original = Message {
            id: Uuid::new_v4(),
            conversation_id: state.id(),
            sender_id: active,
            content: "soru".into(),
            kind: MessageKind::Text,
            file: None,
            reply_to: None,
            edited_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        let mut reply = original.clone();
        reply.id = Uuid::new_v4();
        reply.sender_id = sender.id;
        reply.content = "cevap".into();
        reply.reply_to = Some(original.id);

        let labels = Labels::for_locale(Locale::En);
        let notes = message_notifications(&state.participants, &reply, Some(&original), &vec![sender], &labels, 50);

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].user_id, active);
        assert_eq!(notes[0].kind, NotificationKind::Reply);
        assert_eq!(notes[0].title, "New message from Zeynep");
        assert_eq!(notes[0].body, "cevap");
        assert_eq!(notes[0].metadata.text("message_id"), Some(reply.id.to_string().as_str()));
    }
}
