use std::path::Path;
use std::sync::Arc;

use tokenizers::Tokenizer;

use crate::core::config::RagSettings;
use crate::llm::ChatMessage;

/// Counts tokens for history budgets and the `/api/tokens/count` endpoint.
#[derive(Clone)]
pub enum TokenCounter {
    /// Whitespace-separated words.
    Words,
    /// About four characters per token.
    Heuristic,
    Tokenizer(Arc<Tokenizer>),
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TokenCounter {
    /// Builds the configured counter. A tokenizer that cannot be loaded
    /// degrades to the heuristic.
    pub fn from_settings(settings: &RagSettings) -> Self {
        match settings.token_counter.as_str() {
            "heuristic" => Self::Heuristic,
            "tokenizer" => match settings.tokenizer_path.as_deref() {
                Some(path) => Self::from_file(Path::new(path)).unwrap_or_else(|err| {
                    tracing::warn!(
                        "Failed to load tokenizer from {}: {}. Using heuristic counter",
                        path,
                        err
                    );
                    Self::Heuristic
                }),
                None => {
                    tracing::warn!("rag.tokenizer_path is not set. Using heuristic counter");
                    Self::Heuristic
                }
            },
            _ => Self::Words,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| e.to_string())?;
        Ok(Self::Tokenizer(Arc::new(tokenizer)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Words => "words",
            Self::Heuristic => "heuristic",
            Self::Tokenizer(_) => "tokenizer",
        }
    }

    pub fn count(&self, text: &str) -> usize {
        match self {
            Self::Words => text.split_whitespace().count(),
            Self::Heuristic => text.chars().count().div_ceil(4),
            Self::Tokenizer(tokenizer) => match tokenizer.encode(text, false) {
                Ok(encoding) => encoding.len(),
                Err(err) => {
                    tracing::debug!("Tokenizer failed, estimating instead: {}", err);
                    text.chars().count().div_ceil(4)
                }
            },
        }
    }

    pub fn count_messages(&self, messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| self.count(&m.content)).sum()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::Words
    }
}
