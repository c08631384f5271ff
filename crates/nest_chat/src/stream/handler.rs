use futures::StreamExt;
use nest_core::{ConversationId, ConversationStore, MessageId, Role};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;
use crate::events::ChatEvent;
use crate::provider::{LLMChunk, LLMStream};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOutcome {
    /// The assistant message the fragments went into, once resolved.
    pub message_id: Option<MessageId>,
    pub fragments: usize,
    pub bytes: usize,
    pub cancelled: bool,
}

/// Pour a streamed reply into the conversation's trailing assistant message.
///
/// The target message is resolved once, when the first fragment arrives: it
/// is the most recent message of the conversation if that message has the
/// assistant role. Each fragment is appended to whatever the message holds at
/// that moment. Cancellation stops consumption and leaves the partial content
/// in place.
pub async fn consume_stream(
    store: &ConversationStore,
    conversation_id: ConversationId,
    mut stream: LLMStream,
    cancel: &CancellationToken,
    events: Option<&mpsc::Sender<ChatEvent>>,
) -> Result<StreamOutcome, ChatError> {
    let mut outcome = StreamOutcome::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(conversation_id = %conversation_id, "consume_stream: cancelled");
                outcome.cancelled = true;
                break;
            }
            next = stream.next() => next,
        };

        let token = match next {
            None | Some(Ok(LLMChunk::Done)) => break,
            Some(Ok(LLMChunk::Token(token))) => token,
            Some(Err(error)) => {
                tracing::error!(conversation_id = %conversation_id, error = %error, "consume_stream: upstream stream failed");
                return Err(error.into());
            }
        };
        if token.is_empty() {
            continue;
        }

        let message_id = match outcome.message_id {
            Some(id) => id,
            None => match trailing_assistant(store, conversation_id) {
                Some(id) => {
                    outcome.message_id = Some(id);
                    id
                }
                None => {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        "consume_stream: no assistant message to fill, dropping fragment"
                    );
                    continue;
                }
            },
        };

        if !store.append_message_content(conversation_id, message_id, &token) {
            continue;
        }
        outcome.fragments += 1;
        outcome.bytes += token.len();

        if let Some(tx) = events {
            let _ = tx
                .send(ChatEvent::Token {
                    conversation_id,
                    message_id,
                    content: token,
                })
                .await;
        }
    }

    tracing::debug!(
        conversation_id = %conversation_id,
        fragments = outcome.fragments,
        bytes = outcome.bytes,
        cancelled = outcome.cancelled,
        "consume_stream: finished"
    );
    Ok(outcome)
}

fn trailing_assistant(store: &ConversationStore, conversation_id: ConversationId) -> Option<MessageId> {
    let conversation = store.conversation(conversation_id)?;
    conversation
        .last_message()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.id)
}
