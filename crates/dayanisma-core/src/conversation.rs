use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use dayanisma_types::models::{Conversation, ConversationKind, Participant, ParticipantRole};

use crate::error::ValidationError;

/// A conversation together with its membership rows. Never hard-deleted;
/// archive instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation: Conversation,
    pub participants: Vec<Participant>,
}

impl ConversationState {
    pub fn direct(a: Uuid, b: Uuid, at: DateTime<Utc>) -> Result<Self, ValidationError> {
        if a == b {
            return Err(ValidationError::DirectParticipants(1));
        }
        let conversation = new_conversation(ConversationKind::Direct, None, a, at);
        let participants = [a, b]
            .into_iter()
            .map(|user| participant(conversation.id, user, ParticipantRole::Member, at))
            .collect();
        let state = Self { conversation, participants };
        state.validate()?;
        Ok(state)
    }

    pub fn group(
        creator: Uuid,
        name: Option<String>,
        members: &[Uuid],
        at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let conversation = new_conversation(ConversationKind::Group, name, creator, at);

        let mut participants = vec![participant(conversation.id, creator, ParticipantRole::Admin, at)];
        for &member in members {
            if participants.iter().all(|p| p.user_id != member) {
                participants.push(participant(conversation.id, member, ParticipantRole::Member, at));
            }
        }

        let state = Self { conversation, participants };
        state.validate()?;
        Ok(state)
    }

    pub fn id(&self) -> Uuid {
        self.conversation.id
    }

    pub fn kind(&self) -> ConversationKind {
        self.conversation.kind
    }

    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_active())
    }

    pub fn participant(&self, user_id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: Uuid) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Membership invariants: direct has exactly two active members, group has
    /// at least one active member besides the creator.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let active = self.active_participants().count();
        match self.conversation.kind {
            ConversationKind::Direct if active != 2 => Err(ValidationError::DirectParticipants(active)),
            ConversationKind::Group => {
                let creator = self.conversation.created_by;
                if self.active_participants().any(|p| p.user_id != creator) {
                    Ok(())
                } else {
                    Err(ValidationError::GroupWithoutMembers)
                }
            }
            ConversationKind::Direct => Ok(()),
        }
    }

    /// Add a member to a group, or re-activate one who left.
    pub fn add_participant(&mut self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), ValidationError> {
        self.ensure_group()?;
        let conversation_id = self.id();
        match self.participant_mut(user_id) {
            Some(existing) => {
                existing.left_at = None;
                existing.joined_at = at;
            }
            None => self
                .participants
                .push(participant(conversation_id, user_id, ParticipantRole::Member, at)),
        }
        self.touch(at);
        debug!(conversation = %conversation_id, user = %user_id, "participant added");
        Ok(())
    }

    /// Mark a member as left. The row is kept so history still resolves.
    pub fn remove_participant(&mut self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), ValidationError> {
        self.ensure_group()?;
        let previous = match self.participant_mut(user_id) {
            Some(p) if p.is_active() => p.left_at.replace(at),
            _ => return Ok(()),
        };
        if let Err(e) = self.validate() {
            if let Some(p) = self.participant_mut(user_id) {
                p.left_at = previous;
            }
            return Err(e);
        }
        self.touch(at);
        Ok(())
    }

    /// Only group names are ever displayed, so only groups can be renamed.
    pub fn rename(&mut self, name: Option<String>, at: DateTime<Utc>) -> Result<(), ValidationError> {
        self.ensure_group()?;
        self.conversation.name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self.touch(at);
        Ok(())
    }

    pub fn set_archived(&mut self, archived: bool, at: DateTime<Utc>) {
        self.conversation.is_archived = archived;
        self.touch(at);
    }

    /// Returns false if the user is not a member.
    pub fn set_muted(&mut self, user_id: Uuid, muted: bool) -> bool {
        match self.participant_mut(user_id) {
            Some(p) => {
                p.is_muted = muted;
                true
            }
            None => false,
        }
    }

    fn ensure_group(&self) -> Result<(), ValidationError> {
        match self.conversation.kind {
            ConversationKind::Group => Ok(()),
            ConversationKind::Direct => Err(ValidationError::DirectMembershipChange),
        }
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.conversation.updated_at = at;
    }
}

fn new_conversation(kind: ConversationKind, name: Option<String>, creator: Uuid, at: DateTime<Utc>) -> Conversation {
    Conversation {
        id: Uuid::new_v4(),
        name,
        kind,
        created_by: creator,
        description: None,
        avatar_url: None,
        is_archived: false,
        last_message_at: None,
        created_at: at,
        updated_at: at,
    }
}

fn participant(conversation_id: Uuid, user_id: Uuid, role: ParticipantRole, at: DateTime<Utc>) -> Participant {
    Participant {
        conversation_id,
        user_id,
        role,
        joined_at: at,
        left_at: None,
        is_muted: false,
        last_read_at: None,
    }
}
