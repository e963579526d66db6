//! Dayanışma messaging core
//!
//! Internal staff messaging for the case-management console: conversations,
//! messages, reply threads, reactions and read state. Everything here is
//! synchronous and storage-agnostic; persistence and file upload sit behind
//! the traits in `store`.

pub mod attachment;
pub mod compose;
pub mod config;
pub mod conversation;
pub mod directory;
pub mod error;
pub mod labels;
pub mod message;
pub mod notify;
pub mod preview;
pub mod reactions;
pub mod service;
pub mod store;
pub mod summary;
pub mod thread;
pub mod timeline;

pub use error::{AttachmentError, ChatError, StoreError, ValidationError};
