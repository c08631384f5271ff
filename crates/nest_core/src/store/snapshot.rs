use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::conversation::Conversation;
use crate::error::{Result, TreeError};
use crate::id::ConversationId;

/// An immutable view of every conversation at one store version.
///
/// Snapshots are never mutated after publication; the store builds a new
/// one per command. Holding an `Arc<Snapshot>` is always safe and always
/// consistent.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub(crate) version: u64,
    pub(crate) conversations: HashMap<ConversationId, Arc<Conversation>>,
    /// Conversation ids in creation order.
    pub(crate) order: Vec<ConversationId>,
    pub(crate) active: Option<ConversationId>,
}

impl Snapshot {
    /// Rebuild a snapshot from externally held conversations, e.g. a restore
    /// from some persistence layer. Creation order follows `created_at`.
    /// Nothing is checked here; call [`Snapshot::validate`] on untrusted input.
    pub fn from_conversations(conversations: impl IntoIterator<Item = Conversation>) -> Self {
        let mut all: Vec<Conversation> = conversations.into_iter().collect();
        all.sort_by_key(|c| c.created_at);
        let order = all.iter().map(|c| c.id).collect();
        Self {
            version: 0,
            conversations: all.into_iter().map(|c| (c.id, Arc::new(c))).collect(),
            order,
            active: None,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn active(&self) -> Option<ConversationId> {
        self.active
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.conversations.contains_key(&id)
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.get(&id).map(Arc::as_ref)
    }

    pub(crate) fn get_arc(&self, id: ConversationId) -> Option<&Arc<Conversation>> {
        self.conversations.get(&id)
    }

    /// All conversations in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Conversation> + '_ {
        self.order.iter().filter_map(|id| self.get(*id))
    }

    /// Root conversations in creation order.
    pub fn roots(&self) -> impl Iterator<Item = &Conversation> + '_ {
        self.iter().filter(|c| c.is_root())
    }

    /// Children of `id` in `children_ids` order. Unknown ids are skipped.
    pub fn children_of(&self, id: ConversationId) -> Vec<&Conversation> {
        self.get(id)
            .map(|c| c.children_ids.iter().filter_map(|child| self.get(*child)).collect())
            .unwrap_or_default()
    }

    /// Ids from the root down to `id`, inclusive. Empty if `id` is unknown.
    ///
    /// The walk is bounded by the number of conversations, so a cycle or a
    /// dangling parent link is reported instead of looping.
    pub fn ancestor_ids(&self, id: ConversationId) -> Result<Vec<ConversationId>> {
        let Some(start) = self.get(id) else {
            return Ok(Vec::new());
        };

        let mut path = vec![start.id];
        let mut current = start;
        while let Some(parent_id) = current.parent_id {
            if path.len() >= self.len() {
                return Err(self.walk_violation(id));
            }
            current = self.get(parent_id).ok_or_else(|| {
                TreeError::InvariantViolation(format!(
                    "conversation {} points at missing parent {}",
                    current.id, parent_id
                ))
            })?;
            path.push(current.id);
        }

        path.reverse();
        Ok(path)
    }

    /// Conversations from the root down to `id`, inclusive.
    pub fn path_to_root(&self, id: ConversationId) -> Result<Vec<&Conversation>> {
        Ok(self
            .ancestor_ids(id)?
            .into_iter()
            .filter_map(|c| self.get(c))
            .collect())
    }

    /// The root of the tree containing `id`; `id` itself when unknown or a root.
    pub fn root_of(&self, id: ConversationId) -> Result<ConversationId> {
        Ok(self.ancestor_ids(id)?.first().copied().unwrap_or(id))
    }

    /// Every conversation sharing `id`'s root, in creation order.
    pub fn tree_members(&self, id: ConversationId) -> Result<Vec<&Conversation>> {
        if !self.contains(id) {
            return Ok(Vec::new());
        }
        let root = self.root_of(id)?;
        let mut members = Vec::new();
        for conversation in self.iter() {
            if self.root_of(conversation.id)? == root {
                members.push(conversation);
            }
        }
        Ok(members)
    }

    /// Check the structural invariants: every conversation reaches a root,
    /// parent and child links agree, and branch points exist in their parents.
    pub fn validate(&self) -> Result<()> {
        for conversation in self.iter() {
            self.ancestor_ids(conversation.id)?;

            match (conversation.parent_id, conversation.parent_message_id) {
                (None, None) => {}
                (Some(parent_id), Some(message_id)) => {
                    let parent = self.get(parent_id).ok_or_else(|| {
                        TreeError::InvariantViolation(format!(
                            "conversation {} points at missing parent {}",
                            conversation.id, parent_id
                        ))
                    })?;
                    if parent.message(message_id).is_none() {
                        return Err(TreeError::InvariantViolation(format!(
                            "branch point {} of {} is not in parent {}",
                            message_id, conversation.id, parent_id
                        )));
                    }
                    if !parent.children_ids.contains(&conversation.id) {
                        return Err(TreeError::InvariantViolation(format!(
                            "{} is missing from the children of {}",
                            conversation.id, parent_id
                        )));
                    }
                }
                _ => {
                    return Err(TreeError::InvariantViolation(format!(
                        "conversation {} has only one of parent id / parent message id",
                        conversation.id
                    )));
                }
            }

            let mut seen = HashSet::new();
            for child_id in &conversation.children_ids {
                let linked_back = self
                    .get(*child_id)
                    .is_some_and(|child| child.parent_id == Some(conversation.id));
                if !linked_back || !seen.insert(*child_id) {
                    return Err(TreeError::InvariantViolation(format!(
                        "child link {} -> {} is not mirrored by a parent link",
                        conversation.id, child_id
                    )));
                }
            }
        }
        Ok(())
    }

    fn walk_violation(&self, id: ConversationId) -> TreeError {
        let err = TreeError::InvariantViolation(format!(
            "ancestor walk from {} exceeded {} steps; parent links form a cycle",
            id,
            self.len()
        ));
        tracing::error!(conversation_id = %id, error = %err, "Snapshot: unterminated ancestor walk");
        err
    }
}
