/// Database row types. These map directly to SQLite rows and are kept
/// apart from the dayanisma-types models so the DB layer stays independent.
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use uuid::Uuid;

use dayanisma_types::metadata::Metadata;
use dayanisma_types::models::{
    Conversation, ConversationKind, FileRef, Message, MessageKind, Notification, NotificationKind, Participant,
    ParticipantRole, Presence, Reaction, User,
};

pub struct UserRow {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub presence: String,
}

pub struct ConversationRow {
    pub id: String,
    pub name: Option<String>,
    pub kind: String,
    pub created_by: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub is_archived: bool,
    pub last_message_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ParticipantRow {
    pub conversation_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: String,
    pub left_at: Option<String>,
    pub is_muted: bool,
    pub last_read_at: Option<String>,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub reply_to: Option<String>,
    pub edited_at: Option<String>,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ReactionRow {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub metadata: String,
    pub created_at: String,
}

// -- Column codecs --

pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn opt_ts(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(ts)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    let at = DateTime::parse_from_rfc3339(s).with_context(|| format!("bad timestamp: {s}"))?;
    Ok(at.with_timezone(&Utc))
}

fn parse_opt_ts(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}

fn parse_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("bad id: {s}"))
}

pub fn presence_str(p: Presence) -> &'static str {
    match p {
        Presence::Online => "online",
        Presence::Busy => "busy",
        Presence::Away => "away",
        Presence::Offline => "offline",
    }
}

fn parse_presence(s: &str) -> Result<Presence> {
    match s {
        "online" => Ok(Presence::Online),
        "busy" => Ok(Presence::Busy),
        "away" => Ok(Presence::Away),
        "offline" => Ok(Presence::Offline),
        other => Err(anyhow!("unknown presence: {other}")),
    }
}

pub fn conversation_kind_str(k: ConversationKind) -> &'static str {
    match k {
        ConversationKind::Direct => "direct",
        ConversationKind::Group => "group",
    }
}

fn parse_conversation_kind(s: &str) -> Result<ConversationKind> {
    match s {
        "direct" => Ok(ConversationKind::Direct),
        "group" => Ok(ConversationKind::Group),
        other => Err(anyhow!("unknown conversation kind: {other}")),
    }
}

pub fn role_str(r: ParticipantRole) -> &'static str {
    match r {
        ParticipantRole::Admin => "admin",
        ParticipantRole::Member => "member",
    }
}

fn parse_role(s: &str) -> Result<ParticipantRole> {
    match s {
        "admin" => Ok(ParticipantRole::Admin),
        "member" => Ok(ParticipantRole::Member),
        other => Err(anyhow!("unknown role: {other}")),
    }
}

pub fn message_kind_str(k: MessageKind) -> &'static str {
    match k {
        MessageKind::Text => "text",
        MessageKind::Image => "image",
        MessageKind::File => "file",
        MessageKind::System => "system",
    }
}

fn parse_message_kind(s: &str) -> Result<MessageKind> {
    match s {
        "text" => Ok(MessageKind::Text),
        "image" => Ok(MessageKind::Image),
        "file" => Ok(MessageKind::File),
        "system" => Ok(MessageKind::System),
        other => Err(anyhow!("unknown message kind: {other}")),
    }
}

pub fn notification_kind_str(k: NotificationKind) -> &'static str {
    match k {
        NotificationKind::NewMessage => "new_message",
        NotificationKind::Reply => "reply",
    }
}

fn parse_notification_kind(s: &str) -> Result<NotificationKind> {
    match s {
        "new_message" => Ok(NotificationKind::NewMessage),
        "reply" => Ok(NotificationKind::Reply),
        other => Err(anyhow!("unknown notification kind: {other}")),
    }
}

// -- Row -> model --

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_id(&row.id)?,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            presence: parse_presence(&row.presence)?,
        })
    }
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = anyhow::Error;

    fn try_from(row: ConversationRow) -> Result<Self> {
        Ok(Conversation {
            id: parse_id(&row.id)?,
            name: row.name,
            kind: parse_conversation_kind(&row.kind)?,
            created_by: parse_id(&row.created_by)?,
            description: row.description,
            avatar_url: row.avatar_url,
            is_archived: row.is_archived,
            last_message_at: parse_opt_ts(row.last_message_at.as_deref())?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = anyhow::Error;

    fn try_from(row: ParticipantRow) -> Result<Self> {
        Ok(Participant {
            conversation_id: parse_id(&row.conversation_id)?,
            user_id: parse_id(&row.user_id)?,
            role: parse_role(&row.role)?,
            joined_at: parse_ts(&row.joined_at)?,
            left_at: parse_opt_ts(row.left_at.as_deref())?,
            is_muted: row.is_muted,
            last_read_at: parse_opt_ts(row.last_read_at.as_deref())?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let file = match (row.file_url, row.file_name) {
            (Some(url), Some(name)) => Some(FileRef {
                url,
                name,
                size: u64::try_from(row.file_size.unwrap_or(0)).context("negative file size")?,
            }),
            _ => None,
        };
        Ok(Message {
            id: parse_id(&row.id)?,
            conversation_id: parse_id(&row.conversation_id)?,
            sender_id: parse_id(&row.sender_id)?,
            content: row.content,
            kind: parse_message_kind(&row.kind)?,
            file,
            reply_to: row.reply_to.as_deref().map(parse_id).transpose()?,
            edited_at: parse_opt_ts(row.edited_at.as_deref())?,
            deleted_at: parse_opt_ts(row.deleted_at.as_deref())?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

impl TryFrom<ReactionRow> for Reaction {
    type Error = anyhow::Error;

    fn try_from(row: ReactionRow) -> Result<Self> {
        Ok(Reaction {
            message_id: parse_id(&row.message_id)?,
            user_id: parse_id(&row.user_id)?,
            emoji: row.emoji,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

impl TryFrom<NotificationRow> for Notification {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(&row.metadata).context("bad notification metadata")?;
        Ok(Notification {
            id: parse_id(&row.id)?,
            user_id: parse_id(&row.user_id)?,
            kind: parse_notification_kind(&row.kind)?,
            title: row.title,
            body: row.body,
            is_read: row.is_read,
            metadata: Metadata::from_json(value)?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_as_text() {
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1);
        assert!(ts(early) < ts(late));
        assert_eq!(ts(early), "2024-03-01T09:00:00.000000Z");
        assert_eq!(parse_ts(&ts(late)).unwrap(), late);
    }

    #[test]
    fn message_row_without_file_columns() {
        let id = Uuid::new_v4();
        let row = MessageRow {
            id: id.to_string(),
            conversation_id: Uuid::new_v4().to_string(),
            sender_id: Uuid::new_v4().to_string(),
            content: "merhaba".into(),
            kind: "text".into(),
            file_url: None,
            file_name: None,
            file_size: None,
            reply_to: None,
            edited_at: None,
            deleted_at: None,
            created_at: "2024-03-01T09:00:00.000000Z".into(),
            updated_at: "2024-03-01T09:00:00.000000Z".into(),
        };
        let msg = Message::try_from(row).unwrap();
        assert_eq!(msg.id, id);
        assert!(msg.file.is_none());
        assert_eq!(msg.kind, MessageKind::Text);
    }

    #[test]
    fn unknown_kind_is_an_error() {
        assert!(parse_message_kind("sticker").is_err());
    }
}
