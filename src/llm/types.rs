use serde::{Deserialize, Serialize};

use crate::core::config::LlmSettings;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ROLE_SYSTEM.to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ROLE_USER.to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ROLE_ASSISTANT.to_string(),
            content: content.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == ROLE_SYSTEM
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            top_p: None,
            max_tokens: None,
        }
    }

    pub fn with_settings(mut self, settings: &LlmSettings) -> Self {
        self.temperature = self.temperature.or(Some(settings.temperature));
        self.top_p = self.top_p.or(Some(settings.top_p));
        self.max_tokens = self.max_tokens.or(Some(settings.max_tokens));
        self
    }

    /// Last user turn, used by endpoints that take a single message.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ROLE_USER)
            .map(|m| m.content.as_str())
    }
}
