use async_trait::async_trait;
use futures::stream;
use nest_core::{ChatMessage, Role};

use crate::provider::{LLMChunk, LLMProvider, LLMStream, Result};

/// Answers without a network: acknowledges the last user message, streamed
/// word by word so the UI exercises the same path as a real model.
#[derive(Debug, Clone, Default)]
pub struct EchoProvider;

impl EchoProvider {
    pub fn new() -> Self {
        Self
    }

    fn reply_for(messages: &[ChatMessage]) -> String {
        let question = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.trim())
            .unwrap_or_default();
        let background = messages.iter().filter(|m| m.role == Role::System).count();
        let mut reply = format!(
            "You asked: \"{question}\". I can see {} earlier message(s) in this thread.",
            messages.len().saturating_sub(1 + background)
        );
        if background > 0 {
            reply.push_str(" Notes from branched sub-conversations were included.");
        }
        reply
    }
}

/// Split into fragments that concatenate back to `text`, breaking after spaces.
fn fragments(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl LLMProvider for EchoProvider {
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
    ) -> Result<LLMStream> {
        tracing::debug!(model = ?model, messages = messages.len(), "EchoProvider: replying");
        let mut chunks: Vec<Result<LLMChunk>> = fragments(&Self::reply_for(messages))
            .into_iter()
            .map(|f| Ok(LLMChunk::Token(f)))
            .collect();
        chunks.push(Ok(LLMChunk::Done));
        Ok(Box::pin(stream::iter(chunks)))
    }
}
