use std::collections::HashMap;
use std::str::FromStr;

use serde::Deserialize;

use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    Tr,
    En,
}

impl FromStr for Locale {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tr" | "tr-tr" => Ok(Self::Tr),
            "en" | "en-us" | "en-gb" => Ok(Self::En),
            other => Err(ConfigError::UnknownLocale(other.to_string())),
        }
    }
}

/// Every user-visible string the core produces on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKey {
    UnknownUser,
    GroupChat,
    NoMessages,
    You,
    /// `{name}` is replaced with the sender.
    SentFile,
    /// `{name}` is replaced with the sender.
    SentImage,
    MessageDeleted,
    ReplyUnavailable,
    /// `{name}` is replaced with the sender.
    NewMessageTitle,
}

const ALL_KEYS: [LabelKey; 9] = [
    LabelKey::UnknownUser,
    LabelKey::GroupChat,
    LabelKey::NoMessages,
    LabelKey::You,
    LabelKey::SentFile,
    LabelKey::SentImage,
    LabelKey::MessageDeleted,
    LabelKey::ReplyUnavailable,
    LabelKey::NewMessageTitle,
];

#[derive(Debug, Clone)]
pub struct Labels {
    table: HashMap<LabelKey, String>,
}

impl Labels {
    pub fn for_locale(locale: Locale) -> Self {
        let table = ALL_KEYS
            .iter()
            .map(|&key| {
                let text = match locale {
                    Locale::Tr => turkish(key),
                    Locale::En => english(key),
                };
                (key, text.to_string())
            })
            .collect();
        Self { table }
    }

    /// Replace entries from a JSON object such as `{"group_chat": "Ekip"}`.
    /// Keys not present keep the locale default.
    pub fn with_overrides_json(mut self, json: &str) -> Result<Self, serde_json::Error> {
        let overrides: HashMap<LabelKey, String> = serde_json::from_str(json)?;
        self.table.extend(overrides);
        Ok(self)
    }

    pub fn get(&self, key: LabelKey) -> &str {
        self.table.get(&key).map(String::as_str).unwrap_or_default()
    }

    pub fn render(&self, key: LabelKey, name: &str) -> String {
        self.get(key).replace("{name}", name)
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self::for_locale(Locale::Tr)
    }
}

fn turkish(key: LabelKey) -> &'static str {
    match key {
        LabelKey::UnknownUser => "Bilinmeyen kullanıcı",
        LabelKey::GroupChat => "Grup sohbeti",
        LabelKey::NoMessages => "Henüz mesaj yok",
        LabelKey::You => "Sen",
        LabelKey::SentFile => "{name} bir dosya gönderdi",
        LabelKey::SentImage => "{name} bir görsel gönderdi",
        LabelKey::MessageDeleted => "Bu mesaj silindi",
        LabelKey::ReplyUnavailable => "Orijinal mesaj bulunamadı",
        LabelKey::NewMessageTitle => "{name} size mesaj gönderdi",
    }
}

fn english(key: LabelKey) -> &'static str {
    match key {
        LabelKey::UnknownUser => "Unknown user",
        LabelKey::GroupChat => "Group chat",
        LabelKey::NoMessages => "No messages yet",
        LabelKey::You => "You",
        LabelKey::SentFile => "{name} sent a file",
        LabelKey::SentImage => "{name} sent an image",
        LabelKey::MessageDeleted => "This message was deleted",
        LabelKey::ReplyUnavailable => "Original message unavailable",
        LabelKey::NewMessageTitle => "New message from {name}",
    }
}
