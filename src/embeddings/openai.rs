use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{ensure_count, parse_vector, EmbeddingProvider, Pacer};
use crate::core::config::EmbeddingSettings;
use crate::core::errors::ApiError;
use crate::core::http::{authorize, build_client, error_for_status, trim_base_url, ApiFlavor};

/// OpenAI-shaped `/embeddings` endpoint, either on the DIAL proxy
/// (`/openai/deployments/{model}/embeddings`, `Api-Key` header) or a plain
/// OpenAI-compatible server (`{base_url}/embeddings`, bearer token).
pub struct OpenAiEmbeddings {
    client: Client,
    flavor: ApiFlavor,
    base_url: String,
    model: String,
    api_key: Option<String>,
    batch_size: usize,
    pacer: Pacer,
}

impl OpenAiEmbeddings {
    pub fn new(settings: &EmbeddingSettings, flavor: ApiFlavor) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_client(settings.timeout_secs)?,
            flavor,
            base_url: trim_base_url(&settings.base_url),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            batch_size: settings.batch_size.max(1),
            pacer: Pacer::per_minute(settings.requests_per_minute),
        })
    }

    fn endpoint(&self) -> String {
        match self.flavor {
            ApiFlavor::Dial => format!(
                "{}/openai/deployments/{}/embeddings",
                self.base_url, self.model
            ),
            ApiFlavor::OpenAi => format!("{}/embeddings", self.base_url),
        }
    }

    fn body(&self, batch: &[String]) -> Value {
        match self.flavor {
            ApiFlavor::Dial => json!({ "input": batch }),
            ApiFlavor::OpenAi => json!({ "model": self.model, "input": batch }),
        }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        self.pacer.ready().await;

        let request = self.client.post(self.endpoint()).json(&self.body(batch));
        let res = authorize(request, self.flavor, self.api_key.as_deref())
            .send()
            .await
            .map_err(|err| ApiError::Upstream(format!("Embedding API Error: {}", err)))?;
        let res = error_for_status(res, "Embedding API Error").await?;
        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        let vectors = parse_openai_payload(&payload);
        ensure_count(batch.len(), &vectors)?;
        Ok(vectors)
    }
}

/// `data[].embedding`, ordered by `index` when the server provides it.
fn parse_openai_payload(payload: &Value) -> Vec<Vec<f32>> {
    let Some(data) = payload["data"].as_array() else {
        return Vec::new();
    };

    let mut items: Vec<(usize, Vec<f32>)> = data
        .iter()
        .enumerate()
        .filter_map(|(pos, item)| {
            let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
            parse_vector(&item["embedding"]).map(|v| (index, v))
        })
        .collect();
    items.sort_by_key(|(index, _)| *index);
    items.into_iter().map(|(_, v)| v).collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};

    type Seen = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

    async fn spawn_mock(fail: bool) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));

        async fn handler(
            State((seen, fail)): State<(Seen, bool)>,
            uri: axum::http::Uri,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
            let key = headers
                .get("api-key")
                .or_else(|| headers.get("authorization"))
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            seen.lock().unwrap().push((uri.path().to_string(), key, body.clone()));
            if fail {
                return Err((axum::http::StatusCode::UNAUTHORIZED, "bad key".to_string()));
            }
            let inputs = body["input"].as_array().cloned().unwrap_or_default();
            let data: Vec<Value> = inputs
                .iter()
                .enumerate()
                .rev()
                .map(|(i, text)| {
                    let len = text.as_str().unwrap_or_default().len() as f64;
                    json!({ "index": i, "embedding": [len, 1.0] })
                })
                .collect();
            Ok(Json(json!({ "data": data })))
        }

        let app = Router::new()
            .route("/openai/deployments/:model/embeddings", post(handler))
            .route("/v1/embeddings", post(handler))
            .with_state((seen.clone(), fail));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), seen)
    }

    fn settings(base_url: &str, batch_size: usize) -> EmbeddingSettings {
        EmbeddingSettings {
            provider: "dial".to_string(),
            base_url: base_url.to_string(),
            model: "text-embedding-3-small-1".to_string(),
            api_key: Some("secret".to_string()),
            batch_size,
            requests_per_minute: None,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn dial_batches_and_keeps_input_order() {
        let (base, seen) = spawn_mock(false).await;
        let embeddings = OpenAiEmbeddings::new(&settings(&base, 2), ApiFlavor::Dial).unwrap();

        let texts: Vec<String> = ["a", "bb", "ccc"].iter().map(|s| s.to_string()).collect();
        let vectors = embeddings.embed_documents(&texts).await.unwrap();

        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![2.0, 1.0], vec![3.0, 1.0]]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0].0,
            "/openai/deployments/text-embedding-3-small-1/embeddings"
        );
        assert_eq!(seen[0].1.as_deref(), Some("secret"));
        assert!(seen[0].2.get("model").is_none());
    }

    #[tokio::test]
    async fn openai_flavor_uses_bearer_and_model_field() {
        let (base, seen) = spawn_mock(false).await;
        let embeddings =
            OpenAiEmbeddings::new(&settings(&format!("{}/v1/", base), 16), ApiFlavor::OpenAi)
                .unwrap();

        let vector = embeddings.embed_query("hello").await.unwrap();
        assert_eq!(vector, vec![5.0, 1.0]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "/v1/embeddings");
        assert_eq!(seen[0].1.as_deref(), Some("Bearer secret"));
        assert_eq!(seen[0].2["model"], "text-embedding-3-small-1");
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error() {
        let (base, _) = spawn_mock(true).await;
        let embeddings = OpenAiEmbeddings::new(&settings(&base, 16), ApiFlavor::Dial).unwrap();

        let err = embeddings.embed_query("hello").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "upstream error: Embedding API Error: 401 - bad key"
        );
    }
}
