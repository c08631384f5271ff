//! Context module - Flattening a conversation tree into a model request
//!
//! A branch sees its ancestors' history up to each branch point; a root
//! additionally gets one synthetic system message summarising every
//! sub-conversation beneath it.

mod assembler;

use serde::{Deserialize, Serialize};

pub use assembler::{assemble_context, DESCENDANT_PREAMBLE};

/// What to do when an ancestor does not contain the branch point its child names.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CutoffMissPolicy {
    /// Keep the ancestor's full history and log a warning.
    #[default]
    IncludeAll,
    /// Report an invariant violation.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextOptions {
    pub cutoff_miss: CutoffMissPolicy,
    /// Append the sub-conversation summary when the target is a root.
    pub include_descendants: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            cutoff_miss: CutoffMissPolicy::IncludeAll,
            include_descendants: true,
        }
    }
}
