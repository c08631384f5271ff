pub mod error;
pub mod events;
pub mod provider;
pub mod providers;
pub mod session;
pub mod stream;

pub use error::ChatError;
pub use events::ChatEvent;
pub use provider::{LLMChunk, LLMError, LLMProvider, LLMStream};
pub use providers::{EchoProvider, ScriptedProvider, ScriptedReply};
pub use session::{ChatSession, SendOutcome, SendStatus};
pub use stream::{consume_stream, StreamOutcome};
