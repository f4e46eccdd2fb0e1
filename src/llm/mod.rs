pub mod admin;
pub mod openai;
pub mod provider;
pub mod relay;
pub mod types;

pub use admin::{DeploymentLimits, DialAdmin};
pub use openai::OpenAiChatClient;
pub use provider::{build_chat_model, ChatModel};
pub use relay::GeminiRelayClient;
pub use types::{ChatMessage, ChatRequest};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{ChatModel, ChatRequest};
    use crate::core::errors::ApiError;

    /// Answers `ANSWER: <last user message>` and records every request.
    #[derive(Default)]
    pub(crate) struct EchoChatModel {
        pub(crate) requests: Mutex<Vec<ChatRequest>>,
        pub(crate) fail: bool,
    }

    impl EchoChatModel {
        pub(crate) fn failing() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().map(|r| r.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl ChatModel for EchoChatModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
            let answer = format!("ANSWER: {}", request.last_user_message().unwrap_or_default());
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            if self.fail {
                return Err(ApiError::Upstream("Error: 500 - model down".to_string()));
            }
            Ok(answer)
        }
    }
}
