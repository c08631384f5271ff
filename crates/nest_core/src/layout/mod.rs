//! Layout module - Positions for drawing one conversation tree
//!
//! Each node gets a horizontal span as wide as its subtree, so sibling
//! subtrees never overlap. Depth maps to a fixed vertical step.

mod tidy;

use serde::{Deserialize, Serialize};

use crate::id::ConversationId;

pub use tidy::layout_tree;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Horizontal footprint of one node, gap included.
    pub node_width: f64,
    /// Vertical distance between depth levels.
    pub level_height: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 250.0,
            level_height: 150.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutNode {
    pub id: ConversationId,
    pub title: String,
    /// Centre of the node.
    pub x: f64,
    pub y: f64,
    pub depth: usize,
    /// Width of the span reserved for this node's subtree.
    pub subtree_width: f64,
    /// Whether this is the conversation the layout was requested for.
    pub active: bool,
}

impl LayoutNode {
    /// Left and right edge of the span reserved for this subtree.
    pub fn span(&self) -> (f64, f64) {
        let half = self.subtree_width / 2.0;
        (self.x - half, self.x + half)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayoutEdge {
    /// `"{source}-{target}"`
    pub id: String,
    pub source: ConversationId,
    pub target: ConversationId,
}

impl LayoutEdge {
    pub fn new(source: ConversationId, target: ConversationId) -> Self {
        Self {
            id: format!("{source}-{target}"),
            source,
            target,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TreeLayout {
    pub root: Option<ConversationId>,
    /// Nodes in pre-order.
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
}

impl TreeLayout {
    pub fn node(&self, id: ConversationId) -> Option<&LayoutNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
