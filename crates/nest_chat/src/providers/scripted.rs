use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream;
use nest_core::ChatMessage;
use serde::{Deserialize, Serialize};

use crate::provider::{LLMChunk, LLMError, LLMProvider, LLMStream, Result};

/// One canned response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedReply {
    /// Stream these fragments, then `Done`.
    Reply { fragments: Vec<String> },
    /// Fail the request before any fragment is produced.
    Reject { error: String },
    /// Stream `fragments`, then fail mid-stream.
    Interrupt { fragments: Vec<String>, error: String },
}

impl ScriptedReply {
    pub fn reply<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Reply {
            fragments: fragments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn reject(error: impl Into<String>) -> Self {
        Self::Reject {
            error: error.into(),
        }
    }
}

/// Plays back queued replies in order and records every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Request contexts received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        _model: Option<&str>,
    ) -> Result<LLMStream> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let chunks: Vec<Result<LLMChunk>> = match next {
            None => return Err(LLMError::Unavailable("script exhausted".to_string())),
            Some(ScriptedReply::Reject { error }) => return Err(LLMError::Api(error)),
            Some(ScriptedReply::Reply { fragments }) => fragments
                .into_iter()
                .map(|f| Ok(LLMChunk::Token(f)))
                .chain(std::iter::once(Ok(LLMChunk::Done)))
                .collect(),
            Some(ScriptedReply::Interrupt { fragments, error }) => fragments
                .into_iter()
                .map(|f| Ok(LLMChunk::Token(f)))
                .chain(std::iter::once(Err(LLMError::Stream(error))))
                .collect(),
        };
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_play_back_in_order_then_run_out() {
        let provider = ScriptedProvider::new([
            ScriptedReply::reply(["a", "b"]),
            ScriptedReply::reject("quota"),
        ]);
        let messages = [ChatMessage::user("hi")];

        let first = tokio_test::block_on(provider.complete(&messages, None)).unwrap();
        assert_eq!(first, "ab");

        let second = tokio_test::block_on(provider.complete(&messages, None));
        assert_eq!(second, Err(LLMError::Api("quota".to_string())));

        let third = tokio_test::block_on(provider.complete(&messages, None));
        assert!(matches!(third, Err(LLMError::Unavailable(_))));
        assert_eq!(provider.requests().len(), 3);
    }

    #[test]
    fn script_parses_from_json() {
        let json = r#"[
            {"kind": "reply", "fragments": ["Certainly, ", "X is..."]},
            {"kind": "interrupt", "fragments": ["par"], "error": "reset"}
        ]"#;
        let replies: Vec<ScriptedReply> = serde_json::from_str(json).unwrap();
        assert_eq!(replies[0], ScriptedReply::reply(["Certainly, ", "X is..."]));
        assert!(matches!(replies[1], ScriptedReply::Interrupt { .. }));
    }
}
