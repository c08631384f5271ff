use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use nest_core::ChatMessage;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LLMError {
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, LLMError>;

/// One item of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LLMChunk {
    Token(String),
    /// Explicit end of the reply. Anything after it is ignored.
    Done,
}

pub type LLMStream = Pin<Box<dyn Stream<Item = Result<LLMChunk>> + Send>>;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Stream a chat completion for `messages`.
    ///
    /// # Arguments
    /// * `messages` - Request context, oldest first
    /// * `model` - Optional model override. If None, uses the provider's default model
    async fn chat_stream(&self, messages: &[ChatMessage], model: Option<&str>)
        -> Result<LLMStream>;

    /// Whole reply as one string.
    async fn complete(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<String> {
        let mut stream = self.chat_stream(messages, model).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk? {
                LLMChunk::Token(token) => reply.push_str(&token),
                LLMChunk::Done => break,
            }
        }
        Ok(reply)
    }
}
