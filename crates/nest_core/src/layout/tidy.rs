use std::collections::HashMap;

use super::{LayoutConfig, LayoutEdge, LayoutNode, TreeLayout};
use crate::error::{Result, TreeError};
use crate::id::ConversationId;
use crate::store::Snapshot;

type Children = HashMap<ConversationId, Vec<ConversationId>>;

/// Lay out the tree that contains `active`. The root sits at the origin and
/// each level is `level_height` further down. Unknown ids give an empty layout.
pub fn layout_tree(
    snapshot: &Snapshot,
    active: ConversationId,
    config: &LayoutConfig,
) -> Result<TreeLayout> {
    if !snapshot.contains(active) {
        return Ok(TreeLayout::default());
    }

    let root = snapshot.root_of(active)?;
    let members = snapshot.tree_members(active)?;

    let mut children: Children = HashMap::new();
    for conversation in &members {
        if let Some(parent_id) = conversation.parent_id {
            children.entry(parent_id).or_default().push(conversation.id);
        }
    }

    let widths = subtree_widths(root, &children, config.node_width, members.len())?;

    let mut layout = TreeLayout {
        root: Some(root),
        nodes: Vec::with_capacity(members.len()),
        edges: Vec::with_capacity(members.len().saturating_sub(1)),
    };

    // (id, parent, centre x, depth)
    let mut stack = vec![(root, None, 0.0_f64, 0_usize)];
    while let Some((id, parent, x, depth)) = stack.pop() {
        let Some(conversation) = snapshot.get(id) else {
            continue;
        };
        let width = widths.get(&id).copied().unwrap_or(config.node_width);

        layout.nodes.push(LayoutNode {
            id,
            title: conversation.title.clone(),
            x,
            y: depth as f64 * config.level_height,
            depth,
            subtree_width: width,
            active: id == active,
        });
        if let Some(parent_id) = parent {
            layout.edges.push(LayoutEdge::new(parent_id, id));
        }

        let kids = children.get(&id).map(Vec::as_slice).unwrap_or_default();
        let mut left = x - width / 2.0;
        let mut placed = Vec::with_capacity(kids.len());
        for &child in kids {
            let child_width = widths.get(&child).copied().unwrap_or(config.node_width);
            placed.push((child, Some(id), left + child_width / 2.0, depth + 1));
            left += child_width;
        }
        stack.extend(placed.into_iter().rev());
    }

    tracing::debug!(
        root = %root,
        nodes = layout.nodes.len(),
        edges = layout.edges.len(),
        "layout_tree: laid out tree"
    );
    Ok(layout)
}

/// Post-order width pass: a leaf is `unit` wide, an inner node is as wide as
/// its children together but never narrower than `unit`.
fn subtree_widths(
    root: ConversationId,
    children: &Children,
    unit: f64,
    limit: usize,
) -> Result<HashMap<ConversationId, f64>> {
    let mut widths = HashMap::with_capacity(limit);
    let mut stack = vec![(root, false)];
    let mut visits = 0usize;

    while let Some((id, expanded)) = stack.pop() {
        let kids = children.get(&id).map(Vec::as_slice).unwrap_or_default();
        if expanded {
            let sum: f64 = kids.iter().filter_map(|k| widths.get(k)).sum();
            widths.insert(id, if kids.is_empty() { unit } else { sum.max(unit) });
            continue;
        }

        visits += 1;
        if visits > limit {
            return Err(TreeError::InvariantViolation(format!(
                "layout below {root} visited more than {limit} nodes"
            )));
        }
        stack.push((id, true));
        stack.extend(kids.iter().map(|&k| (k, false)));
    }

    Ok(widths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SequentialIdGenerator;
    use crate::message::Role;
    use crate::store::ConversationStore;
    use std::sync::Arc;

    fn store() -> ConversationStore {
        ConversationStore::new().with_id_generator(Arc::new(SequentialIdGenerator::new()))
    }

    fn branch(store: &ConversationStore, parent: ConversationId) -> ConversationId {
        let msg = store.append_message(parent, Role::Assistant, "text").unwrap();
        store.create_branch(parent, msg, "text").unwrap()
    }

    fn assert_siblings_disjoint(layout: &TreeLayout) {
        for node in &layout.nodes {
            let mut spans: Vec<(f64, f64)> = layout
                .edges
                .iter()
                .filter(|e| e.source == node.id)
                .filter_map(|e| layout.node(e.target))
                .map(LayoutNode::span)
                .collect();
            spans.sort_by(|a, b| a.0.total_cmp(&b.0));
            for pair in spans.windows(2) {
                assert!(pair[0].1 <= pair[1].0, "sibling spans overlap: {pair:?}");
            }
        }
    }

    #[test]
    fn test_single_root_at_origin() {
        let store = store();
        let root = store.create_root();

        let layout = layout_tree(&store.snapshot(), root, &LayoutConfig::default()).unwrap();
        assert_eq!(layout.nodes.len(), 1);
        assert!(layout.edges.is_empty());
        let node = &layout.nodes[0];
        assert_eq!((node.x, node.y), (0.0, 0.0));
        assert!(node.active);
    }

    #[test]
    fn test_two_children_are_centred_under_root() {
        let store = store();
        let root = store.create_root();
        let left = branch(&store, root);
        let right = branch(&store, root);

        let layout = layout_tree(&store.snapshot(), left, &LayoutConfig::default()).unwrap();
        assert_eq!(layout.node(root).unwrap().subtree_width, 500.0);
        let l = layout.node(left).unwrap();
        let r = layout.node(right).unwrap();
        assert_eq!((l.x, l.y), (-125.0, 150.0));
        assert_eq!((r.x, r.y), (125.0, 150.0));
        assert!(l.active && !r.active);
        assert_eq!(layout.edges.len(), 2);
        assert_eq!(layout.edges[0].id, format!("{root}-{left}"));
    }

    #[test]
    fn test_only_child_sits_directly_below() {
        let store = store();
        let root = store.create_root();
        let child = branch(&store, root);

        let layout = layout_tree(&store.snapshot(), root, &LayoutConfig::default()).unwrap();
        assert_eq!(layout.node(child).unwrap().x, 0.0);
    }

    #[test]
    fn test_uneven_tree_keeps_siblings_apart_and_levels_fixed() {
        let store = store();
        let root = store.create_root();
        let a = branch(&store, root);
        let b = branch(&store, root);
        for _ in 0..3 {
            let a_child = branch(&store, a);
            branch(&store, a_child);
            branch(&store, a_child);
        }
        branch(&store, b);

        let config = LayoutConfig {
            node_width: 100.0,
            level_height: 80.0,
        };
        let layout = layout_tree(&store.snapshot(), root, &config).unwrap();

        assert_eq!(layout.nodes.len(), store.len());
        assert_eq!(layout.edges.len(), store.len() - 1);
        assert_eq!(layout.node(a).unwrap().subtree_width, 600.0);
        assert_eq!(layout.node(root).unwrap().subtree_width, 700.0);
        for node in &layout.nodes {
            assert_eq!(node.y, node.depth as f64 * config.level_height);
        }
        assert_siblings_disjoint(&layout);
    }

    #[test]
    fn test_other_trees_are_excluded() {
        let store = store();
        let first = store.create_root();
        branch(&store, first);
        let second = store.create_root();

        let layout = layout_tree(&store.snapshot(), second, &LayoutConfig::default()).unwrap();
        assert_eq!(layout.root, Some(second));
        assert_eq!(layout.nodes.len(), 1);
    }

    #[test]
    fn test_unknown_active_gives_empty_layout() {
        let store = store();
        store.create_root();
        let missing = ConversationId::from_uuid(uuid::Uuid::from_u128(31337));

        let layout = layout_tree(&store.snapshot(), missing, &LayoutConfig::default()).unwrap();
        assert!(layout.is_empty());
        assert_eq!(layout.root, None);
    }
}
