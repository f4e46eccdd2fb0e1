//! Embedding providers.
//!
//! Every provider turns a batch of texts into one vector per text, in input
//! order. Requests are cut into `batch_size` slices and optionally paced with
//! a `governor` limiter so bulk indexing stays under the remote quota.

mod gemini;
mod openai;

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::Value;

pub use gemini::GeminiEmbeddings;
pub use openai::OpenAiEmbeddings;

use crate::core::config::EmbeddingSettings;
use crate::core::errors::ApiError;
use crate::core::http::ApiFlavor;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, recorded with every index build.
    fn model(&self) -> &str;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ApiError::Upstream("Embedding API returned no vectors".to_string()))
    }
}

pub fn build_embedding_provider(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn EmbeddingProvider>, ApiError> {
    let provider: Arc<dyn EmbeddingProvider> = match settings.provider.as_str() {
        "dial" => Arc::new(OpenAiEmbeddings::new(settings, ApiFlavor::Dial)?),
        "openai" => Arc::new(OpenAiEmbeddings::new(settings, ApiFlavor::OpenAi)?),
        "gemini" => Arc::new(GeminiEmbeddings::new(settings)?),
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown embeddings provider: {}",
                other
            )))
        }
    };
    if settings.api_key.is_none() {
        tracing::warn!(
            "No API key configured for {} embeddings; requests will likely be rejected",
            settings.provider
        );
    }
    Ok(provider)
}

/// Optional client-side request pacing.
pub(crate) struct Pacer {
    limiter: Option<DefaultDirectRateLimiter>,
}

impl Pacer {
    pub(crate) fn per_minute(requests_per_minute: Option<u32>) -> Self {
        let limiter = requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));
        Self { limiter }
    }

    pub(crate) async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

pub(crate) fn ensure_count(expected: usize, vectors: &[Vec<f32>]) -> Result<(), ApiError> {
    if vectors.len() != expected {
        return Err(ApiError::Upstream(format!(
            "Embedding API returned {} vectors for {} inputs",
            vectors.len(),
            expected
        )));
    }
    Ok(())
}

pub(crate) fn parse_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|vals| vals.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const DIMENSIONS: usize = 64;

    /// Deterministic bag-of-words embeddings: each lowercase word bumps one
    /// hashed dimension, so texts sharing words score high.
    #[derive(Default)]
    pub(crate) struct KeywordEmbeddings {
        pub(crate) calls: AtomicUsize,
        pub(crate) model: Option<String>,
    }

    impl KeywordEmbeddings {
        pub(crate) fn with_model(model: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                model: Some(model.to_string()),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub(crate) fn keyword_vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let word = word.to_lowercase();
            let slot = word
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % DIMENSIONS;
            vector[slot] += 1.0;
        }
        vector
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbeddings {
        fn model(&self) -> &str {
            self.model.as_deref().unwrap_or("keyword-test")
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| keyword_vector(t)).collect())
        }
    }
}
