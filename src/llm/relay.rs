use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::ChatModel;
use super::types::ChatRequest;
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;
use crate::core::http::{build_client, error_for_status};

/// A small HTTP relay in front of Gemini that takes `{message, semantics}`
/// and answers `{text}`.
#[derive(Clone)]
pub struct GeminiRelayClient {
    client: Client,
    url: String,
}

impl GeminiRelayClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_client(settings.timeout_secs)?,
            url: settings.relay_url.trim().to_string(),
        })
    }
}

#[async_trait]
impl ChatModel for GeminiRelayClient {
    fn name(&self) -> &str {
        "gemini_relay"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let message = request.last_user_message().unwrap_or_default().to_string();
        let semantics = request
            .messages
            .iter()
            .filter(|m| m.is_system())
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let res = self
            .client
            .post(&self.url)
            .json(&json!({ "message": message, "semantics": semantics }))
            .send()
            .await
            .map_err(|err| ApiError::Upstream(format!("Gemini relay error: {}", err)))?;
        let res = error_for_status(res, "Gemini relay error").await?;
        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        let text = payload["text"].as_str().unwrap_or_default();
        Ok(strip_json_fence(text))
    }
}

/// Drops a surrounding ```` ```json ... ``` ```` fence the relay sometimes
/// wraps answers in.
pub fn strip_json_fence(text: &str) -> String {
    text.strip_prefix("```json")
        .and_then(|rest| rest.strip_suffix("```"))
        .map(|inner| inner.trim().to_string())
        .unwrap_or_else(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, routing::post, Json, Router};

    use crate::core::config::Settings;
    use crate::llm::types::ChatMessage;

    #[test]
    fn strips_only_complete_fences() {
        assert_eq!(strip_json_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_json_fence("plain answer"), "plain answer");
        assert_eq!(strip_json_fence("```json unterminated"), "```json unterminated");
    }

    #[tokio::test]
    async fn sends_message_and_semantics() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));

        async fn handler(
            State(seen): State<Arc<Mutex<Option<Value>>>>,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            *seen.lock().unwrap() = Some(body);
            Json(json!({ "text": "```json\n\"fenced\"\n```" }))
        }

        let app = Router::new()
            .route("/api/gemini/generate", post(handler))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut settings = Settings::default().llm;
        settings.relay_url = format!("http://{}/api/gemini/generate", addr);
        let client = GeminiRelayClient::new(&settings).unwrap();

        let answer = client
            .chat(ChatRequest::new(vec![
                ChatMessage::system("prompt"),
                ChatMessage::system("### Relevant App Info"),
                ChatMessage::user("where is the cart?"),
            ]))
            .await
            .unwrap();
        assert_eq!(answer, "\"fenced\"");

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["message"], "where is the cart?");
        assert_eq!(body["semantics"], "prompt\n\n### Relevant App Info");
    }
}
