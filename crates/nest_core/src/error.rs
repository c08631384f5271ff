use std::fmt;

use thiserror::Error;

use crate::id::{ConversationId, MessageId};

/// Which kind of entity a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Conversation,
    Message,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Conversation => f.write_str("conversation"),
            EntityKind::Message => f.write_str("message"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// An id that is not (or no longer) in the store. Usually a stale UI reference.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// The branch point named by a new branch is not a message of its parent.
    #[error("message {message_id} is not part of conversation {conversation_id}")]
    BranchPointNotFound {
        conversation_id: ConversationId,
        message_id: MessageId,
    },

    /// The store is corrupted: a cycle, an unbounded walk, or a dangling branch point.
    #[error("tree invariant violated: {0}")]
    InvariantViolation(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl TreeError {
    pub fn conversation_not_found(id: ConversationId) -> Self {
        Self::NotFound {
            kind: EntityKind::Conversation,
            id: id.to_string(),
        }
    }

    pub fn message_not_found(id: MessageId) -> Self {
        Self::NotFound {
            kind: EntityKind::Message,
            id: id.to_string(),
        }
    }

    /// Only invariant violations indicate corrupted state; everything else is recoverable.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
