use thiserror::Error;

use crate::labels::Locale;

pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_AVATAR_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_PREVIEW_CHARS: usize = 50;
pub const DEFAULT_UNREAD_BADGE_CAP: usize = 99;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
    #[error("unknown locale '{0}'")]
    UnknownLocale(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmojiPolicy {
    /// Any non-empty emoji string up to a small length.
    FreeForm,
    AllowList(Vec<String>),
}

impl EmojiPolicy {
    const MAX_FREE_FORM_CHARS: usize = 16;

    pub fn allows(&self, emoji: &str) -> bool {
        match self {
            Self::FreeForm => {
                let len = emoji.chars().count();
                !emoji.trim().is_empty() && len <= Self::MAX_FREE_FORM_CHARS
            }
            Self::AllowList(list) => list.iter().any(|e| e == emoji),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub max_attachment_bytes: u64,
    pub max_avatar_bytes: u64,
    pub preview_chars: usize,
    pub unread_badge_cap: usize,
    pub locale: Locale,
    pub emoji_policy: EmojiPolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            max_avatar_bytes: DEFAULT_MAX_AVATAR_BYTES,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            unread_badge_cap: DEFAULT_UNREAD_BADGE_CAP,
            locale: Locale::Tr,
            emoji_policy: EmojiPolicy::FreeForm,
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("DAYANISMA_MAX_ATTACHMENT_BYTES") {
            config.max_attachment_bytes = parse_positive("DAYANISMA_MAX_ATTACHMENT_BYTES", &v)?;
        }
        if let Some(v) = lookup("DAYANISMA_MAX_AVATAR_BYTES") {
            config.max_avatar_bytes = parse_positive("DAYANISMA_MAX_AVATAR_BYTES", &v)?;
        }
        if let Some(v) = lookup("DAYANISMA_PREVIEW_CHARS") {
            config.preview_chars = parse_positive("DAYANISMA_PREVIEW_CHARS", &v)? as usize;
        }
        if let Some(v) = lookup("DAYANISMA_UNREAD_BADGE_CAP") {
            config.unread_badge_cap = parse_positive("DAYANISMA_UNREAD_BADGE_CAP", &v)? as usize;
        }
        if let Some(v) = lookup("DAYANISMA_LOCALE") {
            config.locale = v.parse()?;
        }
        if let Some(v) = lookup("DAYANISMA_ALLOWED_EMOJI") {
            let list: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect();
            if !list.is_empty() {
                config.emoji_policy = EmojiPolicy::AllowList(list);
            }
        }

        Ok(config)
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        }),
    }
}
