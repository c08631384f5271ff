use std::collections::HashSet;

use super::{ContextOptions, CutoffMissPolicy};
use crate::conversation::Conversation;
use crate::error::{Result, TreeError};
use crate::id::ConversationId;
use crate::message::{ChatMessage, Message};
use crate::store::Snapshot;

pub const DESCENDANT_PREAMBLE: &str = "The following corresponds to sub-conversations that branched off from this main conversation. Use this context if relevant:";

/// Build the message list to send to the model for `target`.
///
/// Ancestors contribute their messages up to and including the branch point
/// of the next conversation on the path; the target contributes everything.
/// An unknown target yields an empty context.
pub fn assemble_context(
    snapshot: &Snapshot,
    target: ConversationId,
    options: &ContextOptions,
) -> Result<Vec<ChatMessage>> {
    let path = snapshot.path_to_root(target)?;
    let Some(target_conversation) = path.last() else {
        tracing::debug!(conversation_id = %target, "assemble_context: unknown conversation");
        return Ok(Vec::new());
    };

    let mut context = Vec::new();
    for pair in path.windows(2) {
        let messages = ancestor_prefix(pair[0], pair[1], options)?;
        context.extend(messages.iter().map(ChatMessage::from));
    }
    context.extend(target_conversation.messages.iter().map(ChatMessage::from));

    let ancestor_count = context.len() - target_conversation.messages.len();
    if target_conversation.is_root() && options.include_descendants {
        if let Some(summary) = descendant_summary(snapshot, target_conversation)? {
            context.push(summary);
        }
    }

    tracing::debug!(
        conversation_id = %target,
        depth = path.len(),
        ancestor_messages = ancestor_count,
        total_messages = context.len(),
        "assemble_context: built context"
    );
    Ok(context)
}

/// The part of `ancestor` visible to `child`: everything up to the branch point.
fn ancestor_prefix<'a>(
    ancestor: &'a Conversation,
    child: &Conversation,
    options: &ContextOptions,
) -> Result<&'a [Message]> {
    let Some(branch_point) = child.parent_message_id else {
        return Ok(ancestor.messages.as_slice());
    };

    match ancestor.position_of(branch_point) {
        Some(index) => Ok(&ancestor.messages[..=index]),
        None => match options.cutoff_miss {
            CutoffMissPolicy::IncludeAll => {
                tracing::warn!(
                    conversation_id = %ancestor.id,
                    child_id = %child.id,
                    branch_point = %branch_point,
                    "assemble_context: branch point missing, including full ancestor history"
                );
                Ok(ancestor.messages.as_slice())
            }
            CutoffMissPolicy::Fail => {
                let err = TreeError::InvariantViolation(format!(
                    "branch point {} of {} is not in {}",
                    branch_point, child.id, ancestor.id
                ));
                tracing::error!(error = %err, "assemble_context: dangling branch point");
                Err(err)
            }
        },
    }
}

/// One system message with a transcript block per descendant that has messages,
/// in pre-order with children visited in `children_ids` order.
fn descendant_summary(snapshot: &Snapshot, root: &Conversation) -> Result<Option<ChatMessage>> {
    let mut blocks = Vec::new();
    let mut visited = HashSet::from([root.id]);
    let mut stack: Vec<ConversationId> = root.children_ids.iter().rev().copied().collect();

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            let err = TreeError::InvariantViolation(format!(
                "conversation {id} is reachable twice below root {}",
                root.id
            ));
            tracing::error!(error = %err, "assemble_context: cycle in children links");
            return Err(err);
        }
        let Some(conversation) = snapshot.get(id) else {
            continue;
        };
        if !conversation.messages.is_empty() {
            blocks.push(conversation.render_transcript());
        }
        stack.extend(conversation.children_ids.iter().rev().copied());
    }

    if blocks.is_empty() {
        return Ok(None);
    }
    Ok(Some(ChatMessage::system(format!(
        "{DESCENDANT_PREAMBLE}\n\n{}",
        blocks.join("\n\n")
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{MessageId, SequentialIdGenerator};
    use crate::message::Role;
    use crate::store::ConversationStore;
    use std::sync::Arc;

    fn store() -> ConversationStore {
        ConversationStore::new().with_id_generator(Arc::new(SequentialIdGenerator::new()))
    }

    fn contents(context: &[ChatMessage]) -> Vec<&str> {
        context.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_branch_context_stops_at_branch_point() {
        let store = store();
        let root = store.create_root();
        store.append_message(root, Role::User, "q1");
        let a1 = store.append_message(root, Role::Assistant, "a1").unwrap();
        store.append_message(root, Role::User, "q2");
        store.append_message(root, Role::Assistant, "a2");

        let branch = store.create_branch(root, a1, "a1").unwrap();
        store.append_message(branch, Role::User, "tell me more");

        let context = assemble_context(&store.snapshot(), branch, &ContextOptions::default()).unwrap();
        assert_eq!(contents(&context), vec!["q1", "a1", "tell me more"]);
        assert_eq!(context[1].role, Role::Assistant);
    }

    #[test]
    fn test_nested_branches_cut_at_every_level() {
        let store = store();
        let root = store.create_root();
        let r1 = store.append_message(root, Role::Assistant, "r1").unwrap();
        store.append_message(root, Role::Assistant, "r2");
        let mid = store.create_branch(root, r1, "r1").unwrap();
        let m1 = store.append_message(mid, Role::Assistant, "m1").unwrap();
        store.append_message(mid, Role::Assistant, "m2");
        let leaf = store.create_branch(mid, m1, "m1").unwrap();
        store.append_message(leaf, Role::User, "l1");

        let context = assemble_context(&store.snapshot(), leaf, &ContextOptions::default()).unwrap();
        assert_eq!(contents(&context), vec!["r1", "m1", "l1"]);
    }

    #[test]
    fn test_unknown_target_yields_empty_context() {
        let store = store();
        let missing = ConversationId::from_uuid(uuid::Uuid::from_u128(1234));
        let context = assemble_context(&store.snapshot(), missing, &ContextOptions::default()).unwrap();
        assert!(context.is_empty());
    }

    #[test]
    fn test_root_without_branches_has_no_summary() {
        let store = store();
        let root = store.create_root();
        store.append_message(root, Role::User, "hello");

        let context = assemble_context(&store.snapshot(), root, &ContextOptions::default()).unwrap();
        assert_eq!(context, vec![ChatMessage::user("hello")]);
    }

    #[test]
    fn test_root_summary_lists_descendants_in_preorder() {
        let store = store();
        let root = store.create_root();
        let m = store.append_message(root, Role::Assistant, "answer").unwrap();

        let first = store.create_branch(root, m, "first").unwrap();
        let f1 = store.append_message(first, Role::User, "f-q").unwrap();
        let nested = store.create_branch(first, f1, "nested").unwrap();
        store.append_message(nested, Role::User, "n-q");
        let second = store.create_branch(root, m, "second").unwrap();
        store.append_message(second, Role::User, "s-q");
        store.append_message(second, Role::Assistant, "s-a");

        let context = assemble_context(&store.snapshot(), root, &ContextOptions::default()).unwrap();
        assert_eq!(context.len(), 2);
        let summary = &context[1];
        assert_eq!(summary.role, Role::System);
        assert_eq!(
            summary.content,
            format!(
                "{DESCENDANT_PREAMBLE}\n\n\
                 --- Sub-conversation: Sub: first ---\nuser: f-q\n\n\
                 --- Sub-conversation: Sub: nested ---\nuser: n-q\n\n\
                 --- Sub-conversation: Sub: second ---\nuser: s-q\nassistant: s-a"
            )
        );
    }

    #[test]
    fn test_empty_branches_are_skipped_but_their_children_are_not() {
        let store = store().with_settings(
            crate::config::StoreSettings {
                validate_branch_point: false,
                ..Default::default()
            },
            crate::config::TitleSettings::default(),
        );
        let root = store.create_root();
        let m = store.append_message(root, Role::Assistant, "a").unwrap();
        let empty = store.create_branch(root, m, "empty").unwrap();
        let grandchild = store
            .create_branch(empty, MessageId::from_uuid(uuid::Uuid::from_u128(9000)), "deep")
            .unwrap();
        store.append_message(grandchild, Role::User, "deep q");

        let context = assemble_context(&store.snapshot(), root, &ContextOptions::default()).unwrap();
        let summary = &context.last().unwrap().content;
        assert!(!summary.contains("Sub: empty"));
        assert!(summary.contains("--- Sub-conversation: Sub: deep ---\nuser: deep q"));
    }

    #[test]
    fn test_summary_can_be_disabled() {
        let store = store();
        let root = store.create_root();
        let m = store.append_message(root, Role::Assistant, "a").unwrap();
        let branch = store.create_branch(root, m, "b").unwrap();
        store.append_message(branch, Role::User, "q");

        let options = ContextOptions {
            include_descendants: false,
            ..Default::default()
        };
        let context = assemble_context(&store.snapshot(), root, &options).unwrap();
        assert_eq!(context, vec![ChatMessage::assistant("a")]);
    }

    #[test]
    fn test_missing_branch_point_follows_policy() {
        let snapshot_store = store().with_settings(
            crate::config::StoreSettings {
                validate_branch_point: false,
                ..Default::default()
            },
            crate::config::TitleSettings::default(),
        );
        let root = snapshot_store.create_root();
        snapshot_store.append_message(root, Role::User, "one");
        snapshot_store.append_message(root, Role::Assistant, "two");
        let dangling = MessageId::from_uuid(uuid::Uuid::from_u128(777));
        let branch = snapshot_store.create_branch(root, dangling, "x").unwrap();
        let snapshot = snapshot_store.snapshot();

        let lenient = assemble_context(&snapshot, branch, &ContextOptions::default()).unwrap();
        assert_eq!(contents(&lenient), vec!["one", "two"]);

        let strict = ContextOptions {
            cutoff_miss: CutoffMissPolicy::Fail,
            ..Default::default()
        };
        let err = assemble_context(&snapshot, branch, &strict).unwrap_err();
        assert!(err.is_invariant_violation());
    }
}
