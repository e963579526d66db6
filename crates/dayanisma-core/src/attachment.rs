use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::error::AttachmentError;

const IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

const DOCUMENT_TYPES: [&str; 6] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Images plus office documents and plain text.
    File,
    ImageOnly,
}

/// A file picked by the user, not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// Raw bytes when the caller has them; used only for local image previews.
    pub bytes: Option<Vec<u8>>,
}

impl OutgoingFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            bytes: None,
        }
    }

    pub fn with_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
            bytes: Some(bytes),
        }
    }

    pub fn is_image(&self) -> bool {
        is_image_type(&normalize_mime(&self.mime_type))
    }
}

/// Size ceiling plus type allow-list for one upload call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentPolicy {
    pub max_bytes: u64,
}

impl AttachmentPolicy {
    /// Message attachments.
    pub fn messaging(config: &ChatConfig) -> Self {
        Self {
            max_bytes: config.max_attachment_bytes,
        }
    }

    /// Profile and group avatars.
    pub fn avatar(config: &ChatConfig) -> Self {
        Self {
            max_bytes: config.max_avatar_bytes,
        }
    }

    /// Pure check; returns the normalized MIME type on success.
    pub fn validate(&self, file: &OutgoingFile, kind: AttachmentKind) -> Result<String, AttachmentError> {
        if file.size > self.max_bytes {
            return Err(AttachmentError::FileTooLarge {
                size: file.size,
                limit: self.max_bytes,
            });
        }

        let mime = normalize_mime(&file.mime_type);
        let allowed = match kind {
            AttachmentKind::ImageOnly => is_image_type(&mime),
            AttachmentKind::File => is_image_type(&mime) || DOCUMENT_TYPES.contains(&mime.as_str()),
        };
        if !allowed {
            return Err(AttachmentError::UnsupportedType(mime));
        }

        Ok(mime)
    }
}

fn is_image_type(mime: &str) -> bool {
    IMAGE_TYPES.contains(&mime)
}

/// Lowercase, drop parameters (`; charset=...`) and fold the common
/// `image/jpg` alias.
fn normalize_mime(raw: &str) -> String {
    let base = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match base.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => base,
    }
}
