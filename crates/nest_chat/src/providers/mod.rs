//! Offline providers. A network client plugs in through [`crate::LLMProvider`].

mod echo;
mod scripted;

pub use echo::EchoProvider;
pub use scripted::{ScriptedProvider, ScriptedReply};
