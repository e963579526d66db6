use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use dayanisma_core::conversation::ConversationState;
use dayanisma_core::message::{materialize, validate_new_message};
use dayanisma_core::reactions::ReactionChange;
use dayanisma_core::store::{Cursor, MessagePage, PageRequest};
use dayanisma_core::{StoreError, ValidationError};
use dayanisma_types::api::ConversationRecord;
use dayanisma_types::models::{Conversation, Message, MessageKind, NewMessage, Notification, Participant, Reaction, User};

use crate::Database;
use crate::models::{
    ConversationRow, MessageRow, NotificationRow, ParticipantRow, ReactionRow, UserRow, conversation_kind_str,
    message_kind_str, notification_kind_str, now, opt_ts, presence_str, role_str, ts,
};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, kind, file_url, file_name, file_size, \
     reply_to, edited_at, deleted_at, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, display_name, avatar_url, presence) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    display_name = excluded.display_name,
                    avatar_url = excluded.avatar_url,
                    presence = excluded.presence",
                rusqlite::params![
                    user.id.to_string(),
                    user.display_name,
                    user.avatar_url,
                    presence_str(user.presence)
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, display_name, avatar_url, presence FROM users WHERE id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok(UserRow {
                            id: row.get(0)?,
                            display_name: row.get(1)?,
                            avatar_url: row.get(2)?,
                            presence: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            row.map(User::try_from).transpose()
        })
    }

    // -- Conversations --

    pub fn insert_conversation(&self, state: &ConversationState) -> Result<()> {
        state.validate().map_err(validation_failed)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let c = &state.conversation;
            tx.execute(
                "INSERT INTO conversations
                    (id, name, kind, created_by, description, avatar_url, is_archived, last_message_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    c.id.to_string(),
                    c.name,
                    conversation_kind_str(c.kind),
                    c.created_by.to_string(),
                    c.description,
                    c.avatar_url,
                    c.is_archived,
                    opt_ts(c.last_message_at),
                    ts(c.created_at),
                    ts(c.updated_at),
                ],
            )?;
            write_participants(&tx, state)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Persist settings and membership changes made on a loaded conversation.
    /// Read cursors are left alone; they only move through `advance_read_cursor`.
    pub fn save_conversation(&self, state: &ConversationState) -> Result<()> {
        state.validate().map_err(validation_failed)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let c = &state.conversation;
            let changed = tx.execute(
                "UPDATE conversations
                 SET name = ?2, description = ?3, avatar_url = ?4, is_archived = ?5, updated_at = ?6
                 WHERE id = ?1",
                rusqlite::params![
                    c.id.to_string(),
                    c.name,
                    c.description,
                    c.avatar_url,
                    c.is_archived,
                    ts(c.updated_at),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(c.id).into());
            }
            write_participants(&tx, state)?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<ConversationState>> {
        self.with_conn(|conn| query_conversation(conn, &id.to_string()))
    }

    /// Every conversation `user_id` is still part of, newest activity first.
    pub fn conversation_records(&self, user_id: Uuid) -> Result<Vec<ConversationRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id FROM conversation_participants
                 WHERE user_id = ?1 AND left_at IS NULL",
            )?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut records = Vec::with_capacity(ids.len());
            for id in ids {
                let Some(state) = query_conversation(conn, &id)? else {
                    continue;
                };
                let last_read_at = state.participant(user_id).and_then(|p| p.last_read_at);
                let last_message = query_last_message(conn, &id)?;
                let unread_count = count_unread(conn, &id, user_id, last_read_at)?;
                records.push(ConversationRecord {
                    conversation: state.conversation,
                    participants: state.participants,
                    last_message,
                    unread_count,
                });
            }

            records.sort_by(|a, b| {
                let activity = |r: &ConversationRecord| r.conversation.last_message_at.unwrap_or(r.conversation.created_at);
                activity(b).cmp(&activity(a))
            });
            Ok(records)
        })
    }

    // -- Messages --

    /// Validate and store a new message. The store assigns id and timestamps.
    pub fn append_message(&self, new: &NewMessage) -> Result<Message> {
        validate_new_message(new).map_err(validation_failed)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let conversation_id = new.conversation_id.to_string();

            let exists = tx
                .query_row("SELECT 1 FROM conversations WHERE id = ?1", [&conversation_id], |_| Ok(()))
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound(new.conversation_id).into());
            }

            let membership: Option<Option<String>> = tx
                .query_row(
                    "SELECT left_at FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                    [&conversation_id, &new.sender_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if !matches!(membership, Some(None)) {
                return Err(StoreError::ValidationFailed(format!(
                    "sender {} is not an active participant",
                    new.sender_id
                ))
                .into());
            }

            if let Some(target) = new.reply_to {
                let target_conversation: Option<String> = tx
                    .query_row(
                        "SELECT conversation_id FROM messages WHERE id = ?1",
                        [target.to_string()],
                        |row| row.get(0),
                    )
                    .optional()?;
                match target_conversation {
                    None => return Err(StoreError::NotFound(target).into()),
                    Some(c) if c != conversation_id => {
                        return Err(validation_failed(ValidationError::CrossConversationReply(target)).into());
                    }
                    Some(_) => {}
                }
            }

            let msg = materialize(new.clone(), Uuid::new_v4(), now());
            let file = msg.file.as_ref();
            tx.execute(
                &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
                rusqlite::params![
                    msg.id.to_string(),
                    conversation_id,
                    msg.sender_id.to_string(),
                    msg.content,
                    message_kind_str(msg.kind),
                    file.map(|f| f.url.as_str()),
                    file.map(|f| f.name.as_str()),
                    file.map(|f| i64::try_from(f.size).unwrap_or(i64::MAX)),
                    msg.reply_to.map(|id| id.to_string()),
                    opt_ts(msg.edited_at),
                    opt_ts(msg.deleted_at),
                    ts(msg.created_at),
                    ts(msg.updated_at),
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET last_message_at = ?2, updated_at = ?2 WHERE id = ?1",
                [&conversation_id, &ts(msg.created_at)],
            )?;
            tx.commit()?;
            Ok(msg)
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| query_message(conn, &id.to_string()))
    }

    /// One page in display order, starting after `page.after`.
    pub fn get_messages(&self, conversation_id: Uuid, page: &PageRequest) -> Result<MessagePage> {
        self.with_conn(|conn| {
            let id = conversation_id.to_string();
            let exists = conn
                .query_row("SELECT 1 FROM conversations WHERE id = ?1", [&id], |_| Ok(()))
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound(conversation_id).into());
            }

            let limit = page.limit.max(1) as usize;
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                   AND (?2 IS NULL OR created_at > ?2 OR (created_at = ?2 AND id > ?3))
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?4"
            ))?;
            // one extra row tells whether another page exists
            let rows = stmt
                .query_map(
                    rusqlite::params![
                        id,
                        page.after.map(|c| ts(c.created_at)),
                        page.after.map(|c| c.id.to_string()),
                        (limit + 1) as i64,
                    ],
                    message_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut messages = rows.into_iter().map(Message::try_from).collect::<Result<Vec<_>>>()?;
            let next = if messages.len() > limit {
                messages.truncate(limit);
                messages.last().map(Cursor::from)
            } else {
                None
            };
            Ok(MessagePage { messages, next })
        })
    }

    pub fn update_message_content(&self, id: Uuid, content: &str, at: DateTime<Utc>) -> Result<Message> {
        self.with_conn(|conn| {
            let key = id.to_string();
            let msg = query_message(conn, &key)?
                .filter(|m| !m.is_deleted())
                .ok_or(StoreError::NotFound(id))?;
            if msg.kind == MessageKind::Text && content.trim().is_empty() {
                return Err(validation_failed(ValidationError::EmptyMessage).into());
            }

            conn.execute(
                "UPDATE messages SET content = ?2, edited_at = ?3, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![key, content, ts(at)],
            )?;
            query_message(conn, &key)?.ok_or_else(|| StoreError::NotFound(id).into())
        })
    }

    /// Clears content and file but keeps the row so replies and ordering
    /// stay intact. Deleting twice returns the first tombstone.
    pub fn mark_message_deleted(&self, id: Uuid, at: DateTime<Utc>) -> Result<Message> {
        self.with_conn(|conn| {
            let key = id.to_string();
            let msg = query_message(conn, &key)?.ok_or(StoreError::NotFound(id))?;
            if msg.is_deleted() {
                return Ok(msg);
            }

            conn.execute(
                "UPDATE messages
                 SET content = '', file_url = NULL, file_name = NULL, file_size = NULL,
                     deleted_at = ?2, updated_at = ?2
                 WHERE id = ?1",
                [&key, &ts(at)],
            )?;
            query_message(conn, &key)?.ok_or_else(|| StoreError::NotFound(id).into())
        })
    }

    // -- Reactions --

    /// Toggle a reaction: removes it if present, inserts it otherwise.
    pub fn toggle_message_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<ReactionChange> {
        self.with_conn(|conn| {
            let message_key = message_id.to_string();
            let user_key = user_id.to_string();

            let deleted: Option<Option<String>> = conn
                .query_row("SELECT deleted_at FROM messages WHERE id = ?1", [&message_key], |row| row.get(0))
                .optional()?;
            // deleted messages take no reactions
            if !matches!(deleted, Some(None)) {
                return Err(StoreError::NotFound(message_id).into());
            }

            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM message_reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                    rusqlite::params![message_key, user_key, emoji],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                conn.execute("DELETE FROM message_reactions WHERE id = ?1", [&existing_id])?;
                Ok(ReactionChange::Removed)
            } else {
                conn.execute(
                    "INSERT INTO message_reactions (id, message_id, user_id, emoji, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![Uuid::new_v4().to_string(), message_key, user_key, emoji, ts(now())],
                )?;
                Ok(ReactionChange::Added)
            }
        })
    }

    /// Batch-fetch reactions for a set of message IDs, oldest first.
    pub fn get_reactions_for_messages(&self, message_ids: &[Uuid]) -> Result<Vec<Reaction>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, message_id, user_id, emoji, created_at FROM message_reactions
                 WHERE message_id IN ({})
                 ORDER BY created_at ASC, rowid ASC",
                placeholders.join(", ")
            );

            let keys: Vec<String> = message_ids.iter().map(Uuid::to_string).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(keys.iter()), |row| {
                    Ok(ReactionRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        user_id: row.get(2)?,
                        emoji: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(Reaction::try_from).collect()
        })
    }

    // -- Read state --

    /// Move the read cursor forward. Returns whether it moved.
    pub fn advance_read_cursor(&self, conversation_id: Uuid, user_id: Uuid, upto: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let conversation_key = conversation_id.to_string();
            let user_key = user_id.to_string();
            let changed = conn.execute(
                "UPDATE conversation_participants SET last_read_at = ?3
                 WHERE conversation_id = ?1 AND user_id = ?2
                   AND (last_read_at IS NULL OR last_read_at < ?3)",
                [&conversation_key, &user_key, &ts(upto)],
            )?;
            if changed > 0 {
                return Ok(true);
            }

            let known = conn
                .query_row(
                    "SELECT 1 FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                    [&conversation_key, &user_key],
                    |_| Ok(()),
                )
                .optional()?;
            match known {
                Some(()) => Ok(false),
                None => Err(StoreError::NotFound(user_id).into()),
            }
        })
    }

    // -- Notifications --

    pub fn store_notifications(&self, notifications: &[Notification]) -> Result<()> {
        if notifications.is_empty() {
            return Ok(());
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for n in notifications {
                let metadata = serde_json::Value::from(n.metadata.clone()).to_string();
                tx.execute(
                    "INSERT INTO notifications (id, user_id, kind, title, body, is_read, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        n.id.to_string(),
                        n.user_id.to_string(),
                        notification_kind_str(n.kind),
                        n.title,
                        n.body,
                        n.is_read,
                        metadata,
                        ts(n.created_at),
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn unread_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, title, body, is_read, metadata, created_at
                 FROM notifications
                 WHERE user_id = ?1 AND is_read = 0
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: row.get(2)?,
                        title: row.get(3)?,
                        body: row.get(4)?,
                        is_read: row.get(5)?,
                        metadata: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(Notification::try_from).collect()
        })
    }
}

fn validation_failed(e: ValidationError) -> StoreError {
    StoreError::ValidationFailed(e.to_string())
}

fn write_participants(conn: &Connection, state: &ConversationState) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO conversation_participants
            (conversation_id, user_id, role, joined_at, left_at, is_muted, last_read_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(conversation_id, user_id) DO UPDATE SET
            role = excluded.role,
            joined_at = excluded.joined_at,
            left_at = excluded.left_at,
            is_muted = excluded.is_muted",
    )?;
    for p in &state.participants {
        stmt.execute(rusqlite::params![
            state.conversation.id.to_string(),
            p.user_id.to_string(),
            role_str(p.role),
            ts(p.joined_at),
            opt_ts(p.left_at),
            p.is_muted,
            opt_ts(p.last_read_at),
        ])?;
    }
    Ok(())
}

fn query_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationState>> {
    let row = conn
        .query_row(
            "SELECT id, name, kind, created_by, description, avatar_url, is_archived, last_message_at, created_at, updated_at
             FROM conversations WHERE id = ?1",
            [id],
            |row| {
                Ok(ConversationRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    kind: row.get(2)?,
                    created_by: row.get(3)?,
                    description: row.get(4)?,
                    avatar_url: row.get(5)?,
                    is_archived: row.get(6)?,
                    last_message_at: row.get(7)?,
                    created_at: row.get(8)?,
                    updated_at: row.get(9)?,
                })
            },
        )
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT conversation_id, user_id, role, joined_at, left_at, is_muted, last_read_at
         FROM conversation_participants
         WHERE conversation_id = ?1
         ORDER BY joined_at ASC, user_id ASC",
    )?;
    let participants = stmt
        .query_map([id], |row| {
            Ok(ParticipantRow {
                conversation_id: row.get(0)?,
                user_id: row.get(1)?,
                role: row.get(2)?,
                joined_at: row.get(3)?,
                left_at: row.get(4)?,
                is_muted: row.get(5)?,
                last_read_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(ConversationState {
        conversation: Conversation::try_from(row)?,
        participants: participants.into_iter().map(Participant::try_from).collect::<Result<Vec<_>>>()?,
    }))
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        kind: row.get(4)?,
        file_url: row.get(5)?,
        file_name: row.get(6)?,
        file_size: row.get(7)?,
        reply_to: row.get(8)?,
        edited_at: row.get(9)?,
        deleted_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<Message>> {
    let row = conn
        .query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
            [id],
            message_row,
        )
        .optional()?;
    row.map(Message::try_from).transpose()
}

fn query_last_message(conn: &Connection, conversation_id: &str) -> Result<Option<Message>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1"
            ),
            [conversation_id],
            message_row,
        )
        .optional()?;
    row.map(Message::try_from).transpose()
}

/// Messages from others newer than the read cursor.
fn count_unread(conn: &Connection, conversation_id: &str, user_id: Uuid, last_read_at: Option<DateTime<Utc>>) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE conversation_id = ?1 AND sender_id != ?2
           AND (?3 IS NULL OR created_at > ?3)",
        rusqlite::params![conversation_id, user_id.to_string(), opt_ts(last_read_at)],
        |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or(0))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
