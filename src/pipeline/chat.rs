use std::sync::Arc;

use serde::Serialize;

use crate::context::{grounding_block, trim_messages, TokenCounter};
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;
use crate::history::HistoryStore;
use crate::llm::{ChatMessage, ChatModel, ChatRequest};
use crate::rag::Retriever;

pub const NOTHING_RELEVANT: &str = "⚠️ I couldn't find anything relevant in the app.";

/// Stored turns read back per request. Trimming happens afterwards.
const HISTORY_FETCH_LIMIT: i64 = 200;

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub session_id: String,
}

/// Session-aware chat grounded in the app collection.
#[derive(Clone)]
pub struct ChatPipeline {
    retriever: Retriever,
    chat_model: Arc<dyn ChatModel>,
    history: HistoryStore,
    counter: TokenCounter,
    history_max_tokens: usize,
    llm: LlmSettings,
}

impl ChatPipeline {
    pub fn new(
        retriever: Retriever,
        chat_model: Arc<dyn ChatModel>,
        history: HistoryStore,
        counter: TokenCounter,
        history_max_tokens: usize,
        llm: LlmSettings,
    ) -> Self {
        Self {
            retriever,
            chat_model,
            history,
            counter,
            history_max_tokens,
            llm,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Answers `message` within `session_id` (a new session when absent)
    /// and records both turns. Nothing is stored when retrieval or the model
    /// call fails.
    pub async fn respond(
        &self,
        session_id: Option<String>,
        message: &str,
    ) -> Result<ChatReply, ApiError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ApiError::BadRequest("Message must not be empty".to_string()));
        }
        let session_id = session_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut history: Vec<ChatMessage> = self
            .history
            .get_history(&session_id, HISTORY_FETCH_LIMIT)
            .await?
            .iter()
            .map(|m| m.to_chat_message())
            .collect();
        history.push(ChatMessage::user(message));

        let docs = self.retriever.get_relevant_documents(message, None).await?;
        let context = docs
            .iter()
            .map(|d| d.page_content.as_str())
            .filter(|c| !c.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let trimmed = trim_messages(&history, self.history_max_tokens, &self.counter, true);

        let response = if context.trim().is_empty() {
            tracing::info!("No relevant context for session {}", session_id);
            NOTHING_RELEVANT.to_string()
        } else {
            let request = ChatRequest::new(vec![
                ChatMessage::system(self.llm.system_prompt.clone()),
                ChatMessage::system(grounding_block(&trimmed, &context, message)),
                ChatMessage::user(message),
            ])
            .with_settings(&self.llm);
            self.chat_model.chat(request).await?
        };

        self.history
            .add_exchange(&session_id, message, &response)
            .await?;

        Ok(ChatReply {
            response,
            session_id,
        })
    }
}
