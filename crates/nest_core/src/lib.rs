//! nest_core - Branching conversation tree engine
//!
//! This crate owns the state model behind Node Nest:
//! - `store` - ConversationStore, the copy-on-write repository of conversations
//! - `context` - Flattens a tree position into an LLM request context
//! - `layout` - Tidy-tree positions for drawing one conversation tree
//! - `message` / `conversation` - Entity types
//! - `id` - Identifier generation

pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod id;
pub mod layout;
pub mod message;
pub mod paths;
pub mod store;

// Re-export commonly used types
pub use config::{ChatSettings, Config, StoreSettings, TitleSettings};
pub use context::{assemble_context, ContextOptions, CutoffMissPolicy, DESCENDANT_PREAMBLE};
pub use conversation::{truncate_title, Conversation};
pub use error::{EntityKind, Result, TreeError};
pub use id::{ConversationId, IdGenerator, MessageId, SequentialIdGenerator, UuidV4Generator};
pub use layout::{layout_tree, LayoutConfig, LayoutEdge, LayoutNode, TreeLayout};
pub use message::{ChatMessage, Message, Role};
pub use store::{ConversationStore, Snapshot};
