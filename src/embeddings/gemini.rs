use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{ensure_count, parse_vector, EmbeddingProvider, Pacer};
use crate::core::config::EmbeddingSettings;
use crate::core::errors::ApiError;
use crate::core::http::{build_client, error_for_status, trim_base_url};

const TASK_DOCUMENT: &str = "RETRIEVAL_DOCUMENT";
const TASK_QUERY: &str = "RETRIEVAL_QUERY";

/// Google Generative Language `batchEmbedContents`.
pub struct GeminiEmbeddings {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    batch_size: usize,
    pacer: Pacer,
}

impl GeminiEmbeddings {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, ApiError> {
        let model = if settings.model.starts_with("models/") {
            settings.model.clone()
        } else {
            format!("models/{}", settings.model)
        };
        Ok(Self {
            client: build_client(settings.timeout_secs)?,
            base_url: trim_base_url(&settings.base_url),
            model,
            api_key: settings.api_key.clone(),
            batch_size: settings.batch_size.max(1),
            pacer: Pacer::per_minute(settings.requests_per_minute),
        })
    }

    async fn embed_batch(&self, batch: &[String], task_type: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        self.pacer.ready().await;

        let requests: Vec<Value> = batch
            .iter()
            .map(|text| {
                json!({
                    "model": self.model,
                    "content": { "parts": [{ "text": text }] },
                    "taskType": task_type,
                })
            })
            .collect();

        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.model);
        let mut request = self.client.post(url).json(&json!({ "requests": requests }));
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let res = request
            .send()
            .await
            .map_err(|err| ApiError::Upstream(format!("Embedding API Error: {}", err)))?;
        let res = error_for_status(res, "Embedding API Error").await?;
        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        let vectors: Vec<Vec<f32>> = payload["embeddings"]
            .as_array()
            .map(|items| items.iter().filter_map(|item| parse_vector(&item["values"])).collect())
            .unwrap_or_default();
        ensure_count(batch.len(), &vectors)?;
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddings {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch, TASK_DOCUMENT).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self.embed_batch(&[text.to_string()], TASK_QUERY).await?;
        vectors
            .pop()
            .ok_or_else(|| ApiError::Upstream("Embedding API returned no vectors".to_string()))
    }
}
