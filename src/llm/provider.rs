use std::sync::Arc;

use async_trait::async_trait;

use super::openai::OpenAiChatClient;
use super::relay::GeminiRelayClient;
use super::types::ChatRequest;
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;
use crate::core::http::ApiFlavor;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name (e.g. "dial", "openai", "gemini_relay").
    fn name(&self) -> &str;

    /// Chat completion (non-streaming); returns the assistant text.
    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError>;
}

pub fn build_chat_model(settings: &LlmSettings) -> Result<Arc<dyn ChatModel>, ApiError> {
    let model: Arc<dyn ChatModel> = match settings.provider.as_str() {
        "dial" => Arc::new(OpenAiChatClient::new(settings, ApiFlavor::Dial)?),
        "openai" => Arc::new(OpenAiChatClient::new(settings, ApiFlavor::OpenAi)?),
        "gemini_relay" => Arc::new(GeminiRelayClient::new(settings)?),
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown llm provider: {}",
                other
            )))
        }
    };
    Ok(model)
}
