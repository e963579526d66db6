use thiserror::Error;
use uuid::Uuid;

use dayanisma_types::models::MessageKind;

/// Rejection from the attachment check. Surfaced to the user, never stored.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("file is {size} bytes, limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("file type '{0}' is not allowed")]
    UnsupportedType(String),
}

/// Local rule violations caught before anything reaches the store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message has no text and no attachment")]
    EmptyMessage,
    #[error("{0:?} message must carry a file reference")]
    MissingFile(MessageKind),
    #[error("message belongs to conversation {0}, not this one")]
    WrongConversation(Uuid),
    #[error("reply target {0} belongs to another conversation")]
    CrossConversationReply(Uuid),
    #[error("direct conversation needs exactly two participants, found {0}")]
    DirectParticipants(usize),
    #[error("group conversation needs at least one member besides the creator")]
    GroupWithoutMembers,
    #[error("direct conversations cannot change membership")]
    DirectMembershipChange,
    #[error("reaction emoji '{0}' is not allowed")]
    EmojiNotAllowed(String),
}

/// Failure reported by the persistence collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store rejected write: {0}")]
    ValidationFailed(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("record {0} not found")]
    NotFound(Uuid),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("message {0} not found")]
    NotFound(Uuid),
    #[error("user {user} may not {action} message {message}")]
    NotOwner {
        user: Uuid,
        message: Uuid,
        action: &'static str,
    },
    #[error("unknown pending write {0}")]
    UnknownPending(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}
