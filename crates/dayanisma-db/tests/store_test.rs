/// Integration tests: the SQLite store behind the chat service, end to end
/// on a private in-memory database.
use chrono::{Duration, Utc};
use uuid::Uuid;

use dayanisma_core::attachment::{AttachmentKind, OutgoingFile};
use dayanisma_core::config::ChatConfig;
use dayanisma_core::conversation::ConversationState;
use dayanisma_core::reactions::ReactionChange;
use dayanisma_core::service::ChatService;
use dayanisma_core::store::{FileUploader, MessageCursor, MessageStore, PageRequest};
use dayanisma_core::{ChatError, StoreError};
use dayanisma_db::Database;
use dayanisma_types::api::ReplyPreview;
use dayanisma_types::models::{FileRef, Message, MessageKind, NewMessage, NotificationKind, Presence, User};

struct MemoryUploader;

impl FileUploader for MemoryUploader {
    fn upload(&self, file: &OutgoingFile) -> Result<FileRef, StoreError> {
        Ok(FileRef {
            url: format!("mem://{}", file.name),
            name: file.name.clone(),
            size: file.size,
        })
    }
}

fn user(name: &str, presence: Presence) -> User {
    User {
        id: Uuid::new_v4(),
        display_name: name.to_string(),
        avatar_url: None,
        presence,
    }
}

fn text(conversation_id: Uuid, sender_id: Uuid, content: &str) -> NewMessage {
    NewMessage {
        conversation_id,
        sender_id,
        content: content.to_string(),
        kind: MessageKind::Text,
        file: None,
        reply_to: None,
    }
}

/// Direct conversation between two stored users.
fn direct_db() -> (Database, User, User, Uuid) {
    let db = Database::open_in_memory().unwrap();
    let ayse = user("Ayşe", Presence::Online);
    let mehmet = user("Mehmet", Presence::Away);
    db.upsert_user(&ayse).unwrap();
    db.upsert_user(&mehmet).unwrap();

    let state = ConversationState::direct(ayse.id, mehmet.id, Utc::now()).unwrap();
    db.create_conversation(&state).unwrap();
    (db, ayse, mehmet, state.id())
}

fn service(db: Database) -> ChatService<Database, MemoryUploader> {
    ChatService::new(db, MemoryUploader, ChatConfig::default())
}

#[test]
fn direct_hello_shows_up_for_the_recipient() {
    let (db, ayse, mehmet, conv) = direct_db();
    let chat = service(db);

    let mut timeline = chat.load_timeline(conv).unwrap();
    let mut composer = chat.composer(conv);
    composer.set_text("Hello");
    let sent = chat
        .send_draft(&mut composer, ayse.id, &mut timeline, chat.store())
        .unwrap()
        .unwrap();
    assert_eq!(sent.content, "Hello");
    assert!(composer.is_blank());

    let summaries = chat.summaries(mehmet.id, chat.store()).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].display_name, "Ayşe");
    assert_eq!(summaries[0].last_message_preview, "Hello");
    assert_eq!(summaries[0].unread_count, 1);
    assert_eq!(summaries[0].unread_badge.as_deref(), Some("1"));
    assert!(summaries[0].is_online);

    let own = chat.summaries(ayse.id, chat.store()).unwrap();
    assert_eq!(own[0].display_name, "Mehmet");
    assert_eq!(own[0].unread_count, 0);
    assert!(!own[0].is_online);
}

#[test]
fn send_stores_notifications_for_the_other_side() {
    let (db, ayse, mehmet, conv) = direct_db();
    let chat = service(db);

    let mut timeline = chat.load_timeline(conv).unwrap();
    let mut composer = chat.composer(conv);
    composer.set_text("Toplantı saat kaçta?");
    let sent = chat
        .send_draft(&mut composer, ayse.id, &mut timeline, chat.store())
        .unwrap()
        .unwrap();

    let notes = chat.store().unread_notifications(mehmet.id).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::NewMessage);
    assert_eq!(notes[0].metadata.text("message_id"), Some(sent.id.to_string().as_str()));
    assert!(chat.store().unread_notifications(ayse.id).unwrap().is_empty());
}

#[test]
fn pages_walk_forward_without_gaps() {
    let (db, ayse, mehmet, conv) = direct_db();
    let mut sent = Vec::new();
    for i in 0..5 {
        let sender = if i % 2 == 0 { ayse.id } else { mehmet.id };
        sent.push(db.insert_message(&text(conv, sender, &format!("mesaj {i}"))).unwrap());
    }
    let expected: Vec<Uuid> = sent.iter().map(|m| m.id).collect();

    let first = db.list_messages(conv, &PageRequest::first(2)).unwrap();
    assert_eq!(first.messages.len(), 2);
    let second = db.list_messages(conv, &PageRequest::after(first.next.unwrap(), 2)).unwrap();
    assert_eq!(second.messages.len(), 2);
    let third = db.list_messages(conv, &PageRequest::after(second.next.unwrap(), 2)).unwrap();
    assert_eq!(third.messages.len(), 1);
    assert!(third.next.is_none());

    let paged: Vec<Uuid> = [first, second, third]
        .into_iter()
        .flat_map(|p| p.messages)
        .map(|m| m.id)
        .collect();
    assert_eq!(paged, expected);

    let walked: Vec<Uuid> = MessageCursor::new(&db, conv, 2)
        .map(|m| m.map(|m| m.id))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(walked, expected);
}

#[test]
fn exact_page_boundary_ends_cleanly() {
    let (db, ayse, _, conv) = direct_db();
    for i in 0..4 {
        db.insert_message(&text(conv, ayse.id, &format!("{i}"))).unwrap();
    }

    let first = db.list_messages(conv, &PageRequest::first(2)).unwrap();
    let second = db.list_messages(conv, &PageRequest::after(first.next.unwrap(), 2)).unwrap();
    assert_eq!(second.messages.len(), 2);
    assert!(second.next.is_none());
}

#[test]
fn cursor_resumes_where_it_stopped() {
    let (db, ayse, _, conv) = direct_db();
    let ids: Vec<Uuid> = (0..5)
        .map(|i| db.insert_message(&text(conv, ayse.id, &format!("{i}"))).unwrap().id)
        .collect();

    let mut cursor = MessageCursor::new(&db, conv, 2);
    let head: Vec<Uuid> = cursor.by_ref().take(2).map(|m| m.unwrap().id).collect();
    assert_eq!(head, ids[..2]);

    let rest: Vec<Uuid> = MessageCursor::resume(&db, conv, cursor.position(), 2)
        .map(|m| m.unwrap().id)
        .collect();
    assert_eq!(rest, ids[2..]);
}

#[test]
fn listing_unknown_conversation_is_not_found() {
    let db = Database::open_in_memory().unwrap();
    let missing = Uuid::new_v4();
    let err = db.list_messages(missing, &PageRequest::default()).unwrap_err();
    assert_eq!(err, StoreError::NotFound(missing));
}

#[test]
fn read_cursor_drives_unread_counts() {
    let (db, ayse, mehmet, conv) = direct_db();
    db.insert_message(&text(conv, ayse.id, "bir")).unwrap();
    let last = db.insert_message(&text(conv, ayse.id, "iki")).unwrap();

    let records = db.list_conversations(mehmet.id).unwrap();
    assert_eq!(records[0].unread_count, 2);

    db.mark_read(conv, mehmet.id, last.created_at).unwrap();
    assert_eq!(db.list_conversations(mehmet.id).unwrap()[0].unread_count, 0);

    // moving backwards is ignored
    db.mark_read(conv, mehmet.id, last.created_at - Duration::hours(1)).unwrap();
    assert_eq!(db.list_conversations(mehmet.id).unwrap()[0].unread_count, 0);

    db.insert_message(&text(conv, ayse.id, "üç")).unwrap();
    assert_eq!(db.list_conversations(mehmet.id).unwrap()[0].unread_count, 1);

    let state = db.load_conversation(conv).unwrap();
    assert_eq!(state.participant(mehmet.id).unwrap().last_read_at, Some(last.created_at));
}

#[test]
fn mark_read_for_stranger_is_not_found() {
    let (db, _, _, conv) = direct_db();
    let stranger = Uuid::new_v4();
    assert_eq!(db.mark_read(conv, stranger, Utc::now()).unwrap_err(), StoreError::NotFound(stranger));
}

#[test]
fn insert_rejects_bad_messages() {
    let (db, ayse, mehmet, conv) = direct_db();
    let other = ConversationState::direct(ayse.id, Uuid::new_v4(), Utc::now()).unwrap();
    db.create_conversation(&other).unwrap();
    let elsewhere = db.insert_message(&text(other.id(), ayse.id, "başka")).unwrap();

    // reply into another conversation
    let mut reply = text(conv, mehmet.id, "cevap");
    reply.reply_to = Some(elsewhere.id);
    assert!(matches!(db.insert_message(&reply), Err(StoreError::ValidationFailed(_))));

    // reply to nothing
    let ghost = Uuid::new_v4();
    reply.reply_to = Some(ghost);
    assert_eq!(db.insert_message(&reply).unwrap_err(), StoreError::NotFound(ghost));

    // outsider
    assert!(matches!(
        db.insert_message(&text(conv, Uuid::new_v4(), "selam")),
        Err(StoreError::ValidationFailed(_))
    ));

    // blank text
    assert!(matches!(
        db.insert_message(&text(conv, ayse.id, "   ")),
        Err(StoreError::ValidationFailed(_))
    ));

    let missing = Uuid::new_v4();
    assert_eq!(db.insert_message(&text(missing, ayse.id, "x")).unwrap_err(), StoreError::NotFound(missing));
}

#[test]
fn insert_bumps_last_message_at() {
    let (db, ayse, _, conv) = direct_db();
    let msg = db.insert_message(&text(conv, ayse.id, "selam")).unwrap();
    let state = db.load_conversation(conv).unwrap();
    assert_eq!(state.conversation.last_message_at, Some(msg.created_at));
}

#[test]
fn edit_and_soft_delete() {
    let (db, ayse, _, conv) = direct_db();
    let msg = db.insert_message(&text(conv, ayse.id, "taslak")).unwrap();

    let edited = db.edit_message(msg.id, "son hali", Utc::now()).unwrap();
    assert_eq!(edited.content, "son hali");
    assert!(edited.edited_at.is_some());

    let deleted = db.soft_delete_message(msg.id, Utc::now()).unwrap();
    assert!(deleted.is_deleted());
    assert!(deleted.content.is_empty());

    let again = db.soft_delete_message(msg.id, Utc::now()).unwrap();
    assert_eq!(again.deleted_at, deleted.deleted_at);

    assert_eq!(db.edit_message(msg.id, "geri", Utc::now()).unwrap_err(), StoreError::NotFound(msg.id));
    assert_eq!(db.toggle_reaction(msg.id, ayse.id, "👍").unwrap_err(), StoreError::NotFound(msg.id));
    // the row survives for ordering and replies
    assert_eq!(db.get_message(msg.id).unwrap().unwrap().id, msg.id);
}

#[test]
fn reaction_toggle_is_idempotent() {
    let (db, ayse, mehmet, conv) = direct_db();
    let msg = db.insert_message(&text(conv, ayse.id, "tebrikler")).unwrap();

    assert_eq!(db.toggle_reaction(msg.id, mehmet.id, "👍").unwrap(), ReactionChange::Added);
    assert_eq!(db.toggle_reaction(msg.id, ayse.id, "👍").unwrap(), ReactionChange::Added);
    assert_eq!(db.list_reactions(&[msg.id]).unwrap().len(), 2);

    assert_eq!(db.toggle_reaction(msg.id, mehmet.id, "👍").unwrap(), ReactionChange::Removed);
    let left = db.list_reactions(&[msg.id]).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].user_id, ayse.id);

    let missing = Uuid::new_v4();
    assert_eq!(db.toggle_reaction(missing, ayse.id, "👍").unwrap_err(), StoreError::NotFound(missing));
    assert!(db.list_reactions(&[]).unwrap().is_empty());
}

#[test]
fn reactions_survive_a_reload() {
    let (db, ayse, mehmet, conv) = direct_db();
    let msg = db.insert_message(&text(conv, ayse.id, "duyuru")).unwrap();
    let chat = service(db);

    let mut timeline = chat.load_timeline(conv).unwrap();
    chat.toggle_reaction(&mut timeline, msg.id, mehmet.id, "❤️").unwrap();
    chat.toggle_reaction(&mut timeline, msg.id, mehmet.id, "👍").unwrap();
    chat.toggle_reaction(&mut timeline, msg.id, mehmet.id, "❤️").unwrap();

    let reloaded = chat.load_timeline(conv).unwrap();
    let groups = reloaded.reactions(msg.id, mehmet.id);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].emoji, "👍");
    assert_eq!(groups[0].count, 1);
    assert!(groups[0].reacted_by_viewer);
}

#[test]
fn deleted_message_shows_no_reactions_after_reload() {
    let (db, ayse, mehmet, conv) = direct_db();
    let msg = db.insert_message(&text(conv, ayse.id, "yanlış grup")).unwrap();
    let chat = service(db);

    let mut timeline = chat.load_timeline(conv).unwrap();
    chat.toggle_reaction(&mut timeline, msg.id, mehmet.id, "😮").unwrap();
    chat.delete_message(&mut timeline, msg.id, ayse.id).unwrap();
    assert!(timeline.reactions(msg.id, mehmet.id).is_empty());

    let reloaded = chat.load_timeline(conv).unwrap();
    let items = chat.render_thread(&reloaded, mehmet.id, chat.store());
    let tombstone = items.iter().find(|i| i.message_id == msg.id).unwrap();
    assert!(tombstone.is_deleted);
    assert!(tombstone.reactions.is_empty());
}

#[test]
fn deleted_reply_target_renders_placeholder() {
    let (db, ayse, mehmet, conv) = direct_db();
    let chat = service(db);
    let mut timeline = chat.load_timeline(conv).unwrap();

    let mut composer = chat.composer(conv);
    composer.set_text("Rapor hazır mı?");
    let original: Message = chat
        .send_draft(&mut composer, ayse.id, &mut timeline, chat.store())
        .unwrap()
        .unwrap();

    let mut composer = chat.composer(conv);
    composer.set_text("Yarın hazır");
    composer.set_reply_target(Some(original.id));
    let reply = chat
        .send_draft(&mut composer, mehmet.id, &mut timeline, chat.store())
        .unwrap()
        .unwrap();

    let notes = chat.store().unread_notifications(ayse.id).unwrap();
    assert_eq!(notes[0].kind, NotificationKind::Reply);

    chat.delete_message(&mut timeline, original.id, ayse.id).unwrap();

    let reloaded = chat.load_timeline(conv).unwrap();
    let items = chat.render_thread(&reloaded, mehmet.id, chat.store());
    let reply_item = items.iter().find(|i| i.message_id == reply.id).unwrap();
    assert!(matches!(reply_item.reply, Some(ReplyPreview::Unavailable { .. })));
    let gone = items.iter().find(|i| i.message_id == original.id).unwrap();
    assert!(gone.is_deleted);
    assert!(!gone.body.contains("Rapor"));
}

#[test]
fn only_the_author_may_edit() {
    let (db, ayse, mehmet, conv) = direct_db();
    let msg = db.insert_message(&text(conv, ayse.id, "benim")).unwrap();
    let chat = service(db);
    let mut timeline = chat.load_timeline(conv).unwrap();

    let err = chat.edit_message(&mut timeline, msg.id, mehmet.id, "değil").unwrap_err();
    assert!(matches!(err, ChatError::NotOwner { .. }));

    let edited = chat.edit_message(&mut timeline, msg.id, ayse.id, "düzeltildi").unwrap();
    assert_eq!(timeline.get(msg.id).unwrap().content, "düzeltildi");
    assert_eq!(chat.store().get_message(msg.id).unwrap().unwrap().edited_at, edited.edited_at);
}

#[test]
fn group_image_without_caption() {
    let db = Database::open_in_memory().unwrap();
    let creator = user("Elif", Presence::Online);
    let members = [Uuid::new_v4(), Uuid::new_v4()];
    db.upsert_user(&creator).unwrap();
    let state = ConversationState::group(creator.id, Some("Saha Ekibi".into()), &members, Utc::now()).unwrap();
    db.create_conversation(&state).unwrap();
    let conv = state.id();
    let chat = service(db);

    let mut timeline = chat.load_timeline(conv).unwrap();
    let mut composer = chat.composer(conv);
    composer
        .attach(OutgoingFile::new("saha.png", "image/png", 2_000_000), AttachmentKind::File)
        .unwrap();
    let sent = chat
        .send_draft(&mut composer, creator.id, &mut timeline, chat.store())
        .unwrap()
        .unwrap();
    assert_eq!(sent.kind, MessageKind::Image);
    assert_eq!(sent.content, "");
    assert_eq!(sent.file.as_ref().unwrap().url, "mem://saha.png");

    let summaries = chat.summaries(members[0], chat.store()).unwrap();
    assert_eq!(summaries[0].display_name, "Saha Ekibi");
    assert_eq!(summaries[0].unread_count, 1);
    assert_eq!(chat.store().unread_notifications(members[1]).unwrap().len(), 1);
}

#[test]
fn membership_changes_persist() {
    let db = Database::open_in_memory().unwrap();
    let creator = Uuid::new_v4();
    let (stays, leaves) = (Uuid::new_v4(), Uuid::new_v4());
    let mut state = ConversationState::group(creator, None, &[stays, leaves], Utc::now()).unwrap();
    db.create_conversation(&state).unwrap();

    let now = Utc::now();
    state.rename(Some("Lojistik".into()), now).unwrap();
    state.set_muted(stays, true);
    state.remove_participant(leaves, now).unwrap();
    db.save_conversation(&state).unwrap();

    let loaded = db.load_conversation(state.id()).unwrap();
    assert_eq!(loaded.conversation.name.as_deref(), Some("Lojistik"));
    assert!(loaded.participant(stays).unwrap().is_muted);
    assert!(!loaded.participant(leaves).unwrap().is_active());

    assert!(db.list_conversations(leaves).unwrap().is_empty());
    assert_eq!(db.list_conversations(stays).unwrap().len(), 1);
}

#[test]
fn invalid_conversation_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let mut state = ConversationState::group(Uuid::new_v4(), None, &[Uuid::new_v4()], Utc::now()).unwrap();
    state.participants.truncate(1);
    assert!(matches!(db.create_conversation(&state), Err(StoreError::ValidationFailed(_))));
    assert_eq!(db.load_conversation(state.id()).unwrap_err(), StoreError::NotFound(state.id()));
}

#[test]
fn conversations_sorted_by_activity() {
    let (db, ayse, mehmet, older) = direct_db();
    let third = user("Deniz", Presence::Offline);
    db.upsert_user(&third).unwrap();
    let newer = ConversationState::direct(ayse.id, third.id, Utc::now()).unwrap();
    db.create_conversation(&newer).unwrap();

    db.insert_message(&text(older, mehmet.id, "eski")).unwrap();
    db.insert_message(&text(newer.id(), third.id, "yeni")).unwrap();

    let records = db.list_conversations(ayse.id).unwrap();
    let order: Vec<Uuid> = records.iter().map(|r| r.conversation.id).collect();
    assert_eq!(order, vec![newer.id(), older]);
    assert_eq!(records[0].last_message.as_ref().unwrap().content, "yeni");
}
