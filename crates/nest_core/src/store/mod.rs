//! Store module - The conversation repository
//!
//! `ConversationStore` is the single source of truth for the conversation
//! forest. Every command clones the current [`Snapshot`], applies its change
//! to the copy and publishes the copy as a whole, so readers never observe a
//! half-applied mutation. Commands that reference unknown ids are absorbed as
//! no-ops (a UI may hold stale ids); only invariant violations surface.

mod snapshot;

use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{StoreSettings, TitleSettings};
use crate::conversation::{truncate_title, Conversation};
use crate::error::{Result, TreeError};
use crate::id::{ConversationId, IdGenerator, MessageId, UuidV4Generator};
use crate::message::{Message, Role};

pub use snapshot::Snapshot;

pub struct ConversationStore {
    current: RwLock<Arc<Snapshot>>,
    ids: Arc<dyn IdGenerator>,
    settings: StoreSettings,
    titles: TitleSettings,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("ConversationStore")
            .field("version", &snapshot.version())
            .field("conversations", &snapshot.len())
            .field("active", &snapshot.active())
            .finish()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::default())
    }

    /// Start from an existing snapshot, e.g. one rebuilt by an external persistence layer.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            ids: Arc::new(UuidV4Generator),
            settings: StoreSettings::default(),
            titles: TitleSettings::default(),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_settings(mut self, settings: StoreSettings, titles: TitleSettings) -> Self {
        self.settings = settings;
        self.titles = titles;
        self
    }

    /// The current published snapshot. Cheap; later commands do not affect it.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn conversation(&self, id: ConversationId) -> Option<Arc<Conversation>> {
        self.snapshot().get_arc(id).cloned()
    }

    pub fn active(&self) -> Option<ConversationId> {
        self.snapshot().active()
    }

    /// Root conversations in creation order.
    pub fn roots(&self) -> Vec<Arc<Conversation>> {
        let snapshot = self.snapshot();
        snapshot
            .roots()
            .filter_map(|c| snapshot.get_arc(c.id).cloned())
            .collect()
    }

    /// Conversations in the same tree as `id`, in creation order.
    pub fn tree_members(&self, id: ConversationId) -> Result<Vec<Arc<Conversation>>> {
        let snapshot = self.snapshot();
        let members = snapshot.tree_members(id)?;
        Ok(members
            .into_iter()
            .filter_map(|c| snapshot.get_arc(c.id).cloned())
            .collect())
    }

    /// Conversations from the root down to `id`, inclusive; empty for unknown ids.
    pub fn path_to_root(&self, id: ConversationId) -> Result<Vec<Arc<Conversation>>> {
        let snapshot = self.snapshot();
        Ok(snapshot
            .ancestor_ids(id)?
            .into_iter()
            .filter_map(|c| snapshot.get_arc(c).cloned())
            .collect())
    }

    pub fn root_of(&self, id: ConversationId) -> Result<ConversationId> {
        self.snapshot().root_of(id)
    }

    /// Start a new tree. Always succeeds; the new root becomes active.
    pub fn create_root(&self) -> ConversationId {
        let id = ConversationId::from_uuid(self.ids.next_id());
        let conversation = Conversation::root(id, self.settings.default_title.clone());

        let result = self.commit(|next| {
            next.conversations.insert(id, Arc::new(conversation));
            next.order.push(id);
            next.active = Some(id);
            Ok(())
        });

        tracing::info!(
            conversation_id = %id,
            version = result.unwrap_or_default(),
            "ConversationStore: created root"
        );
        id
    }

    /// Branch off `parent_id` at `parent_message_id`. The title is derived
    /// from `label` (usually the selected passage) and the branch becomes active.
    pub fn create_branch(
        &self,
        parent_id: ConversationId,
        parent_message_id: MessageId,
        label: &str,
    ) -> Result<ConversationId> {
        let id = ConversationId::from_uuid(self.ids.next_id());
        let title = self.branch_title(label);

        let result = self.commit(|next| {
            let parent = next
                .conversations
                .get_mut(&parent_id)
                .ok_or_else(|| TreeError::conversation_not_found(parent_id))?;

            if self.settings.validate_branch_point && parent.message(parent_message_id).is_none() {
                return Err(TreeError::BranchPointNotFound {
                    conversation_id: parent_id,
                    message_id: parent_message_id,
                });
            }

            Arc::make_mut(parent).children_ids.push(id);
            let branch = Conversation::branch(id, parent_id, parent_message_id, title);
            next.conversations.insert(id, Arc::new(branch));
            next.order.push(id);
            next.active = Some(id);
            Ok(())
        });

        match result {
            Ok(version) => {
                tracing::info!(
                    conversation_id = %id,
                    parent_id = %parent_id,
                    parent_message_id = %parent_message_id,
                    version,
                    "ConversationStore: created branch"
                );
                Ok(id)
            }
            Err(e) => {
                tracing::warn!(parent_id = %parent_id, error = %e, "ConversationStore: branch rejected");
                Err(e)
            }
        }
    }

    /// Append a message with a fresh id. Returns `None` (and changes nothing)
    /// if the conversation does not exist.
    pub fn append_message(
        &self,
        conversation_id: ConversationId,
        role: Role,
        content: impl Into<String>,
    ) -> Option<MessageId> {
        let message_id = MessageId::from_uuid(self.ids.next_id());
        let message = Message::new(message_id, role, content);

        let result = self.commit(|next| {
            let conversation = conversation_mut(next, conversation_id)?;
            conversation.messages.push(message);
            Ok(conversation.messages.len())
        });

        match result {
            Ok(_) => {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    message_id = %message_id,
                    role = %role,
                    "ConversationStore: appended message"
                );
                Some(message_id)
            }
            Err(e) => {
                absorb("append_message", &e);
                None
            }
        }
    }

    /// Replace a message's content in place. Returns whether anything changed.
    pub fn update_message_content(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        content: impl Into<String>,
    ) -> bool {
        let content = content.into();
        self.edit_message(conversation_id, message_id, "update_message_content", |message| {
            message.content = content;
        })
    }

    /// Append `fragment` to a message's current content as one command, so
    /// a fragment can never be lost to a concurrent reader or writer.
    pub fn append_message_content(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        fragment: &str,
    ) -> bool {
        self.edit_message(conversation_id, message_id, "append_message_content", |message| {
            message.content.push_str(fragment);
        })
    }

    pub fn set_title(&self, conversation_id: ConversationId, title: impl Into<String>) -> bool {
        let title = title.into();
        let result = self.commit(|next| {
            conversation_mut(next, conversation_id)?.title = title;
            Ok(())
        });
        result.map_err(|e| absorb("set_title", &e)).is_ok()
    }

    /// Record which conversation the UI is showing. Unknown ids are ignored.
    pub fn set_active(&self, conversation_id: ConversationId) -> bool {
        let result = self.commit(|next| {
            if !next.contains(conversation_id) {
                return Err(TreeError::conversation_not_found(conversation_id));
            }
            next.active = Some(conversation_id);
            Ok(())
        });
        result.map_err(|e| absorb("set_active", &e)).is_ok()
    }

    /// Branch deletion is not part of the model; this always fails.
    pub fn delete_conversation(&self, conversation_id: ConversationId) -> Result<()> {
        tracing::warn!(conversation_id = %conversation_id, "ConversationStore: delete requested but unsupported");
        Err(TreeError::Unsupported("delete"))
    }

    fn branch_title(&self, label: &str) -> String {
        format!(
            "{}{}",
            self.titles.branch_prefix,
            truncate_title(label, self.titles.branch_label_chars, &self.titles.ellipsis)
        )
    }

    fn edit_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        op: &'static str,
        edit: impl FnOnce(&mut Message),
    ) -> bool {
        let result = self.commit(|next| {
            let message = conversation_mut(next, conversation_id)?
                .message_mut(message_id)
                .ok_or_else(|| TreeError::message_not_found(message_id))?;
            edit(message);
            Ok(())
        });
        result.map_err(|e| absorb(op, &e)).is_ok()
    }

    /// Apply `change` to a copy of the current snapshot and publish the copy.
    /// On error nothing is published. Returns the new version.
    fn commit<T>(&self, change: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<u64> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Snapshot::clone(&current);
        change(&mut next)?;
        next.version += 1;
        let version = next.version;
        *current = Arc::new(next);
        Ok(version)
    }
}

fn conversation_mut(snapshot: &mut Snapshot, id: ConversationId) -> Result<&mut Conversation> {
    snapshot
        .conversations
        .get_mut(&id)
        .map(Arc::make_mut)
        .ok_or_else(|| TreeError::conversation_not_found(id))
}

fn absorb(op: &str, error: &TreeError) {
    tracing::warn!(op, error = %error, "ConversationStore: ignoring command on stale id");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SequentialIdGenerator;

    fn store() -> ConversationStore {
        ConversationStore::new().with_id_generator(Arc::new(SequentialIdGenerator::new()))
    }

    fn store_with_message() -> (ConversationStore, ConversationId, MessageId) {
        let store = store();
        let root = store.create_root();
        let msg = store.append_message(root, Role::Assistant, "Certainly").unwrap();
        (store, root, msg)
    }

    #[test]
    fn test_create_root_is_active_and_empty() {
        let store = store();
        let root = store.create_root();

        let convo = store.conversation(root).unwrap();
        assert_eq!(convo.title, "New Conversation");
        assert!(convo.is_root());
        assert!(convo.messages.is_empty());
        assert!(convo.children_ids.is_empty());
        assert_eq!(store.active(), Some(root));
    }

    #[test]
    fn test_create_branch_registers_child() {
        let (store, root, msg) = store_with_message();
        let branch = store.create_branch(root, msg, "a passage").unwrap();

        assert_eq!(store.conversation(root).unwrap().children_ids, vec![branch]);
        let convo = store.conversation(branch).unwrap();
        assert_eq!(convo.parent_id, Some(root));
        assert_eq!(convo.parent_message_id, Some(msg));
        assert_eq!(convo.title, "Sub: a passage");
        assert_eq!(store.active(), Some(branch));
        store.snapshot().validate().unwrap();
    }

    #[test]
    fn test_branch_title_is_truncated() {
        let (store, root, msg) = store_with_message();
        let branch = store
            .create_branch(root, msg, "this selection is definitely longer than twenty")
            .unwrap();
        assert_eq!(
            store.conversation(branch).unwrap().title,
            "Sub: this selection is de..."
        );
    }

    #[test]
    fn test_create_branch_on_missing_parent_fails() {
        let (store, _, msg) = store_with_message();
        let missing = ConversationId::from_uuid(uuid::Uuid::from_u128(999));
        let before = store.version();

        let err = store.create_branch(missing, msg, "x").unwrap_err();
        assert!(matches!(err, TreeError::NotFound { .. }));
        assert_eq!(store.version(), before);
    }

    #[test]
    fn test_create_branch_rejects_foreign_branch_point() {
        let store = store();
        let first = store.create_root();
        let foreign = store.append_message(first, Role::User, "hi").unwrap();
        let second = store.create_root();

        let err = store.create_branch(second, foreign, "x").unwrap_err();
        assert_eq!(
            err,
            TreeError::BranchPointNotFound {
                conversation_id: second,
                message_id: foreign
            }
        );
        assert!(store.conversation(second).unwrap().children_ids.is_empty());
    }

    #[test]
    fn test_unvalidated_branch_point_is_accepted_when_disabled() {
        let settings = StoreSettings {
            validate_branch_point: false,
            ..Default::default()
        };
        let store = store().with_settings(settings, TitleSettings::default());
        let root = store.create_root();
        let dangling = MessageId::from_uuid(uuid::Uuid::from_u128(500));

        assert!(store.create_branch(root, dangling, "x").is_ok());
    }

    #[test]
    fn test_append_to_missing_conversation_is_noop() {
        let store = store();
        let missing = ConversationId::from_uuid(uuid::Uuid::from_u128(42));
        assert!(store.append_message(missing, Role::User, "lost").is_none());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_update_message_content_in_place() {
        let (store, root, msg) = store_with_message();
        assert!(store.update_message_content(root, msg, "replaced"));
        assert_eq!(store.conversation(root).unwrap().messages[0].content, "replaced");

        let missing = MessageId::from_uuid(uuid::Uuid::from_u128(77));
        assert!(!store.update_message_content(root, missing, "nope"));
    }

    #[test]
    fn test_append_message_content_concatenates() {
        let (store, root, msg) = store_with_message();
        assert!(store.append_message_content(root, msg, ", X"));
        assert!(store.append_message_content(root, msg, " is..."));
        assert_eq!(
            store.conversation(root).unwrap().messages[0].content,
            "Certainly, X is..."
        );
    }

    #[test]
    fn test_old_snapshots_are_unaffected_by_later_commands() {
        let (store, root, msg) = store_with_message();
        let before = store.snapshot();

        store.update_message_content(root, msg, "changed");
        store.set_title(root, "Renamed");

        let old = before.get(root).unwrap();
        assert_eq!(old.messages[0].content, "Certainly");
        assert_eq!(old.title, "New Conversation");
        assert!(store.version() > before.version());
    }

    #[test]
    fn test_set_title_and_active_ignore_unknown_ids() {
        let store = store();
        let root = store.create_root();
        let missing = ConversationId::from_uuid(uuid::Uuid::from_u128(404));

        assert!(store.set_title(root, "Renamed"));
        assert!(!store.set_title(missing, "x"));
        assert!(!store.set_active(missing));
        assert_eq!(store.active(), Some(root));
    }

    #[test]
    fn test_roots_in_creation_order() {
        let store = store();
        let a = store.create_root();
        let msg = store.append_message(a, Role::User, "q").unwrap();
        store.create_branch(a, msg, "b").unwrap();
        let c = store.create_root();

        let roots: Vec<ConversationId> = store.roots().iter().map(|c| c.id).collect();
        assert_eq!(roots, vec![a, c]);
    }

    #[test]
    fn test_tree_members_only_same_tree() {
        let store = store();
        let a = store.create_root();
        let msg = store.append_message(a, Role::User, "q").unwrap();
        let b = store.create_branch(a, msg, "b").unwrap();
        let other = store.create_root();

        let members: Vec<ConversationId> =
            store.tree_members(b).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(members, vec![a, b]);
        assert_eq!(store.tree_members(other).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_is_unsupported() {
        let store = store();
        let root = store.create_root();
        assert_eq!(
            store.delete_conversation(root),
            Err(TreeError::Unsupported("delete"))
        );
        assert!(store.conversation(root).is_some());
    }
}
