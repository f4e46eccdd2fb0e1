use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::ChatModel;
use super::types::ChatRequest;
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;
use crate::core::http::{authorize, build_client, error_for_status, trim_base_url, ApiFlavor};

/// Chat completions over the DIAL proxy or any OpenAI-compatible server
/// (including Gemini's OpenAI endpoint).
#[derive(Clone)]
pub struct OpenAiChatClient {
    client: Client,
    flavor: ApiFlavor,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(settings: &LlmSettings, flavor: ApiFlavor) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_client(settings.timeout_secs)?,
            flavor,
            base_url: trim_base_url(&settings.base_url),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        match self.flavor {
            ApiFlavor::Dial => format!(
                "{}/openai/deployments/{}/chat/completions",
                self.base_url, self.model
            ),
            ApiFlavor::OpenAi => format!("{}/chat/completions", self.base_url),
        }
    }

    fn body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "messages": request.messages,
        });

        if let Some(obj) = body.as_object_mut() {
            if self.flavor == ApiFlavor::OpenAi {
                obj.insert("model".to_string(), json!(self.model));
            }
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
            if let Some(t) = request.top_p {
                obj.insert("top_p".to_string(), json!(t));
            }
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    fn name(&self) -> &str {
        match self.flavor {
            ApiFlavor::Dial => "dial",
            ApiFlavor::OpenAi => "openai",
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let builder = self.client.post(self.endpoint()).json(&self.body(&request));
        let res = authorize(builder, self.flavor, self.api_key.as_deref())
            .send()
            .await
            .map_err(|err| ApiError::Upstream(format!("Error: {}", err)))?;
        let res = error_for_status(res, "Error").await?;
        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::Upstream("Chat completion response had no message content".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};

    use crate::core::config::Settings;
    use crate::llm::types::ChatMessage;

    type Seen = Arc<Mutex<Vec<(String, HeaderMap, Value)>>>;

    async fn spawn_mock() -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));

        async fn handler(
            State(seen): State<Seen>,
            uri: axum::http::Uri,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
            seen.lock()
                .unwrap()
                .push((uri.path().to_string(), headers, body.clone()));
            let last = body["messages"]
                .as_array()
                .and_then(|m| m.last())
                .and_then(|m| m["content"].as_str())
                .unwrap_or_default()
                .to_string();
            if last == "fail" {
                return Err((axum::http::StatusCode::TOO_MANY_REQUESTS, "slow down".to_string()));
            }
            Ok(Json(json!({
                "choices": [{ "message": { "role": "assistant", "content": format!("echo: {}", last) } }]
            })))
        }

        let app = Router::new()
            .route("/openai/deployments/:model/chat/completions", post(handler))
            .route("/v1/chat/completions", post(handler))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), seen)
    }

    fn settings(base_url: String) -> LlmSettings {
        let mut settings = Settings::default().llm;
        settings.base_url = base_url;
        settings.api_key = Some("dial-key".to_string());
        settings.timeout_secs = 5;
        settings
    }

    #[tokio::test]
    async fn dial_posts_to_deployment_with_sampling_params() {
        let (base, seen) = spawn_mock().await;
        let llm_settings = settings(base);
        let client = OpenAiChatClient::new(&llm_settings, ApiFlavor::Dial).unwrap();

        let request = ChatRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
        ])
        .with_settings(&llm_settings);
        let answer = client.chat(request).await.unwrap();
        assert_eq!(answer, "echo: hello");

        let seen = seen.lock().unwrap();
        let (path, headers, body) = &seen[0];
        assert_eq!(
            path,
            "/openai/deployments/gpt-4o-mini-2024-07-18/chat/completions"
        );
        assert_eq!(headers.get("api-key").unwrap(), "dial-key");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["top_p"], 1.0);
        assert!(body.get("model").is_none());
    }

    #[tokio::test]
    async fn openai_flavor_sends_model_and_bearer() {
        let (base, seen) = spawn_mock().await;
        let client =
            OpenAiChatClient::new(&settings(format!("{}/v1", base)), ApiFlavor::OpenAi).unwrap();

        client
            .chat(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "/v1/chat/completions");
        assert_eq!(seen[0].1.get("authorization").unwrap(), "Bearer dial-key");
        assert_eq!(seen[0].2["model"], "gpt-4o-mini-2024-07-18");
        assert!(seen[0].2.get("temperature").is_none());
    }

    #[tokio::test]
    async fn error_status_becomes_upstream_error() {
        let (base, _) = spawn_mock().await;
        let client = OpenAiChatClient::new(&settings(base), ApiFlavor::Dial).unwrap();

        let err = client
            .chat(ChatRequest::new(vec![ChatMessage::user("fail")]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "upstream error: Error: 429 - slow down");
    }
}
