use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dayanisma_types::api::ReactionGroup;
use dayanisma_types::models::Reaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionChange {
    Added,
    Removed,
}

impl ReactionChange {
    pub fn inverse(self) -> Self {
        match self {
            Self::Added => Self::Removed,
            Self::Removed => Self::Added,
        }
    }
}

/// Collapse flat reaction rows into one group per emoji, in the order each
/// emoji was first seen. Duplicate (user, emoji) rows count once.
pub fn aggregate(reactions: &[Reaction], viewer: Uuid) -> Vec<ReactionGroup> {
    let mut groups: Vec<ReactionGroup> = Vec::new();

    for r in reactions {
        let idx = match groups.iter().position(|g| g.emoji == r.emoji) {
            Some(idx) => idx,
            None => {
                groups.push(ReactionGroup {
                    emoji: r.emoji.clone(),
                    count: 0,
                    reacted_by_viewer: false,
                    user_ids: Vec::new(),
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[idx];
        if group.user_ids.contains(&r.user_id) {
            continue;
        }
        group.user_ids.push(r.user_id);
        group.count += 1;
        group.reacted_by_viewer |= r.user_id == viewer;
    }

    groups
}

/// Reactions on a single message. At most one row per (user, emoji).
#[derive(Debug, Clone, Default)]
pub struct ReactionSet {
    message_id: Uuid,
    rows: Vec<Reaction>,
}

impl ReactionSet {
    pub fn new(message_id: Uuid) -> Self {
        Self {
            message_id,
            rows: Vec::new(),
        }
    }

    pub fn has(&self, user_id: Uuid, emoji: &str) -> bool {
        self.rows.iter().any(|r| r.user_id == user_id && r.emoji == emoji)
    }

    /// Idempotent: returns false if the pair was already present.
    pub fn add(&mut self, user_id: Uuid, emoji: &str, at: DateTime<Utc>) -> bool {
        if self.has(user_id, emoji) {
            return false;
        }
        self.rows.push(Reaction {
            message_id: self.message_id,
            user_id,
            emoji: emoji.to_string(),
            created_at: at,
        });
        true
    }

    /// Returns false if there was nothing to remove.
    pub fn remove(&mut self, user_id: Uuid, emoji: &str) -> bool {
        let before = self.rows.len();
        self.rows.retain(|r| !(r.user_id == user_id && r.emoji == emoji));
        self.rows.len() != before
    }

    pub fn toggle(&mut self, user_id: Uuid, emoji: &str, at: DateTime<Utc>) -> ReactionChange {
        if self.remove(user_id, emoji) {
            ReactionChange::Removed
        } else {
            self.add(user_id, emoji, at);
            ReactionChange::Added
        }
    }

    pub fn rows(&self) -> &[Reaction] {
        &self.rows
    }

    pub fn groups(&self, viewer: Uuid) -> Vec<ReactionGroup> {
        aggregate(&self.rows, viewer)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
