//! ChatSession - one user turn against the conversation tree
//!
//! A turn appends the user message, builds the request context from the tree,
//! appends an empty assistant placeholder and streams the reply into it. A
//! failed model call never escapes as an error: the placeholder is replaced
//! with the configured error text so the transcript shows what happened.

use std::sync::Arc;

use nest_core::{
    assemble_context, truncate_title, Config, ConversationId, ConversationStore, MessageId, Role,
    TreeError,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;
use crate::events::ChatEvent;
use crate::provider::LLMProvider;
use crate::stream::consume_stream;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Completed,
    Cancelled,
    /// The model call failed; the assistant message holds the error text.
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SendOutcome {
    pub conversation_id: ConversationId,
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
    pub status: SendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ChatSession {
    store: Arc<ConversationStore>,
    provider: Arc<dyn LLMProvider>,
    config: Config,
    events: Option<mpsc::Sender<ChatEvent>>,
}

impl ChatSession {
    pub fn new(store: Arc<ConversationStore>, provider: Arc<dyn LLMProvider>, config: Config) -> Self {
        Self {
            store,
            provider,
            config,
            events: None,
        }
    }

    /// Forward token/completion events to `events`.
    pub fn with_events(mut self, events: mpsc::Sender<ChatEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send `content` as the user in `conversation_id` and stream the reply.
    ///
    /// Errors only for an unknown conversation or a corrupted tree; upstream
    /// failures are reported through [`SendOutcome::status`].
    pub async fn send(
        &self,
        conversation_id: ConversationId,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<SendOutcome, ChatError> {
        let conversation = self
            .store
            .conversation(conversation_id)
            .ok_or_else(|| TreeError::conversation_not_found(conversation_id))?;

        if conversation.messages.is_empty() {
            let titles = &self.config.titles;
            let title = truncate_title(content, titles.auto_title_chars, &titles.ellipsis);
            self.store.set_title(conversation_id, title);
        }

        let user_message_id = self
            .store
            .append_message(conversation_id, Role::User, content)
            .ok_or_else(|| TreeError::conversation_not_found(conversation_id))?;

        // Built after the user message so the request ends with it.
        let context = assemble_context(&self.store.snapshot(), conversation_id, &self.config.context)?;

        let assistant_message_id = self
            .store
            .append_message(conversation_id, Role::Assistant, "")
            .ok_or_else(|| TreeError::conversation_not_found(conversation_id))?;

        tracing::info!(
            conversation_id = %conversation_id,
            context_messages = context.len(),
            model = ?self.config.chat.model,
            "ChatSession: requesting reply"
        );

        let model = self.config.chat.model.as_deref();
        let streamed = match self.provider.chat_stream(&context, model).await {
            Ok(stream) => {
                consume_stream(&self.store, conversation_id, stream, cancel, self.events.as_ref())
                    .await
            }
            Err(e) => Err(e.into()),
        };

        let mut outcome = SendOutcome {
            conversation_id,
            user_message_id,
            assistant_message_id,
            status: SendStatus::Completed,
            error: None,
        };

        match streamed {
            Ok(result) => {
                if result.cancelled {
                    outcome.status = SendStatus::Cancelled;
                }
                self.emit(ChatEvent::Completed {
                    conversation_id,
                    message_id: assistant_message_id,
                    cancelled: result.cancelled,
                })
                .await;
            }
            Err(ChatError::Upstream(e)) => {
                tracing::error!(conversation_id = %conversation_id, error = %e, "ChatSession: reply failed");
                self.store.update_message_content(
                    conversation_id,
                    assistant_message_id,
                    self.config.chat.error_message.clone(),
                );
                outcome.status = SendStatus::Failed;
                outcome.error = Some(e.to_string());
                self.emit(ChatEvent::Failed {
                    conversation_id,
                    message_id: assistant_message_id,
                    error: e.to_string(),
                })
                .await;
            }
            Err(e) => return Err(e),
        }

        Ok(outcome)
    }

    /// Branch from `parent_message_id` on the selected passage and ask about it
    /// in the new branch.
    pub async fn branch_and_ask(
        &self,
        parent_id: ConversationId,
        parent_message_id: MessageId,
        selected_text: &str,
        cancel: &CancellationToken,
    ) -> Result<SendOutcome, ChatError> {
        let branch_id = self
            .store
            .create_branch(parent_id, parent_message_id, selected_text)?;
        let prompt = self.config.chat.branch_prompt(selected_text);
        self.send(branch_id, &prompt, cancel).await
    }

    async fn emit(&self, event: ChatEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
