use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::debug;
use uuid::Uuid;

use dayanisma_types::models::{FileRef, MessageKind, NewMessage};

use crate::attachment::{AttachmentKind, AttachmentPolicy, OutgoingFile};
use crate::error::AttachmentError;

/// An accepted attachment waiting for send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAttachment {
    pub file: OutgoingFile,
    pub kind: AttachmentKind,
    pub mime_type: String,
    /// `data:` URL for images whose bytes were supplied. Display only.
    pub preview: Option<String>,
    /// Set once the file is in storage, so a retried send does not upload it again.
    pub uploaded: Option<FileRef>,
}

impl PendingAttachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Payload handed to the store side by a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub conversation_id: Uuid,
    pub content: String,
    pub attachment: Option<PendingAttachment>,
    pub reply_to: Option<Uuid>,
}

impl OutgoingMessage {
    pub fn message_kind(&self) -> MessageKind {
        match &self.attachment {
            None => MessageKind::Text,
            Some(a) if a.is_image() => MessageKind::Image,
            Some(_) => MessageKind::File,
        }
    }

    /// `file` is the reference returned by the uploader for the attachment.
    pub fn into_new_message(self, sender_id: Uuid, file: Option<FileRef>) -> NewMessage {
        let kind = self.message_kind();
        NewMessage {
            conversation_id: self.conversation_id,
            sender_id,
            content: self.content,
            kind,
            file,
            reply_to: self.reply_to,
        }
    }
}

/// Draft state for one conversation view. Single writer: the active user.
#[derive(Debug, Clone)]
pub struct Composer {
    conversation_id: Uuid,
    policy: AttachmentPolicy,
    text: String,
    attachment: Option<PendingAttachment>,
    reply_to: Option<Uuid>,
}

impl Composer {
    pub fn new(conversation_id: Uuid, policy: AttachmentPolicy) -> Self {
        Self {
            conversation_id,
            policy,
            text: String::new(),
            attachment: None,
            reply_to: None,
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Validate and stage a file. A rejected file leaves any earlier
    /// attachment in place.
    pub fn attach(&mut self, file: OutgoingFile, kind: AttachmentKind) -> Result<(), AttachmentError> {
        let mime_type = self.policy.validate(&file, kind)?;

        let preview = match (&file.bytes, mime_type.starts_with("image/")) {
            (Some(bytes), true) => Some(format!("data:{};base64,{}", mime_type, B64.encode(bytes))),
            _ => None,
        };

        debug!(name = %file.name, size = file.size, %mime_type, "attachment staged");
        self.attachment = Some(PendingAttachment {
            file,
            kind,
            mime_type,
            preview,
            uploaded: None,
        });
        Ok(())
    }

    /// Remember where the staged file was uploaded.
    pub fn record_upload(&mut self, file: FileRef) {
        if let Some(attachment) = self.attachment.as_mut() {
            attachment.uploaded = Some(file);
        }
    }

    pub fn attachment(&self) -> Option<&PendingAttachment> {
        self.attachment.as_ref()
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = None;
    }

    pub fn set_reply_target(&mut self, message_id: Option<Uuid>) {
        self.reply_to = message_id;
    }

    pub fn cancel_reply(&mut self) {
        self.reply_to = None;
    }

    pub fn reply_target(&self) -> Option<Uuid> {
        self.reply_to
    }

    pub fn can_send(&self) -> bool {
        !self.text.trim().is_empty() || self.attachment.is_some()
    }

    pub fn is_blank(&self) -> bool {
        self.text.is_empty() && self.attachment.is_none() && self.reply_to.is_none()
    }

    /// Snapshot of what a send would submit, or `None` if sending is disabled.
    pub fn payload(&self) -> Option<OutgoingMessage> {
        if !self.can_send() {
            return None;
        }
        Some(OutgoingMessage {
            conversation_id: self.conversation_id,
            content: self.text.trim().to_string(),
            attachment: self.attachment.clone(),
            reply_to: self.reply_to,
        })
    }

    /// Hand the payload to `deliver`. The draft is reset only when delivery
    /// succeeds; on failure it is kept intact for a retry. Returns `None`
    /// without calling `deliver` when there is nothing to send.
    pub fn send<F, T, E>(&mut self, deliver: F) -> Option<Result<T, E>>
    where
        F: FnOnce(OutgoingMessage) -> Result<T, E>,
    {
        let payload = self.payload()?;
        let result = deliver(payload);
        if result.is_ok() {
            self.clear();
        }
        Some(result)
    }

    fn clear(&mut self) {
        self.text.clear();
        self.attachment = None;
        self.reply_to = None;
    }
}
