//! Conversation module - One node of a conversation tree

mod title;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ConversationId, MessageId};
use crate::message::Message;

pub use title::truncate_title;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    /// Append-only; see `ConversationStore::append_message`.
    pub messages: Vec<Message>,
    /// `None` only for a tree root.
    pub parent_id: Option<ConversationId>,
    /// The parent message this branch split from. Set iff `parent_id` is set.
    pub parent_message_id: Option<MessageId>,
    /// Branches created from this conversation, in creation order.
    pub children_ids: Vec<ConversationId>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn root(id: ConversationId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            messages: Vec::new(),
            parent_id: None,
            parent_message_id: None,
            children_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn branch(
        id: ConversationId,
        parent_id: ConversationId,
        parent_message_id: MessageId,
        title: impl Into<String>,
    ) -> Self {
        Self {
            parent_id: Some(parent_id),
            parent_message_id: Some(parent_message_id),
            ..Self::root(id, title)
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn message(&self, message_id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn message_mut(&mut self, message_id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Index of the message with `message_id`, if present.
    pub fn position_of(&self, message_id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }

    /// `"--- Sub-conversation: {title} ---"` header followed by one `role: content` line per message.
    pub fn render_transcript(&self) -> String {
        let lines: Vec<String> = self.messages.iter().map(|m| m.transcript_line()).collect();
        format!("--- Sub-conversation: {} ---\n{}", self.title, lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use uuid::Uuid;

    fn cid(n: u128) -> ConversationId {
        ConversationId::from_uuid(Uuid::from_u128(n))
    }

    fn mid(n: u128) -> MessageId {
        MessageId::from_uuid(Uuid::from_u128(n))
    }

    #[test]
    fn test_branch_sets_parent_link_and_branch_point() {
        let branch = Conversation::branch(cid(2), cid(1), mid(9), "Sub: x");
        assert!(!branch.is_root());
        assert_eq!(branch.parent_id, Some(cid(1)));
        assert_eq!(branch.parent_message_id, Some(mid(9)));
        assert!(branch.messages.is_empty());
        assert!(branch.children_ids.is_empty());
    }

    #[test]
    fn test_render_transcript() {
        let mut convo = Conversation::root(cid(1), "Sub: Rust");
        convo.messages.push(Message::new(mid(1), Role::User, "why?"));
        convo.messages.push(Message::new(mid(2), Role::Assistant, "because"));
        assert_eq!(
            convo.render_transcript(),
            "--- Sub-conversation: Sub: Rust ---\nuser: why?\nassistant: because"
        );
    }

    #[test]
    fn test_position_of() {
        let mut convo = Conversation::root(cid(1), "t");
        convo.messages.push(Message::new(mid(1), Role::User, "a"));
        convo.messages.push(Message::new(mid(2), Role::User, "b"));
        assert_eq!(convo.position_of(mid(2)), Some(1));
        assert_eq!(convo.position_of(mid(3)), None);
    }
}
