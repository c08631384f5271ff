use nest_core::{ConversationId, MessageId};
use serde::{Deserialize, Serialize};

/// Progress of a reply, for a UI that renders as fragments arrive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Token {
        conversation_id: ConversationId,
        message_id: MessageId,
        content: String,
    },
    Completed {
        conversation_id: ConversationId,
        message_id: MessageId,
        cancelled: bool,
    },
    Failed {
        conversation_id: ConversationId,
        message_id: MessageId,
        error: String,
    },
}
