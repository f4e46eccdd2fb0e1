//! Read-only DIAL management calls: model catalogue and per-deployment
//! token limits.

use std::collections::BTreeMap;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::core::errors::ApiError;
use crate::core::http::{authorize, build_client, error_for_status, trim_base_url, ApiFlavor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeploymentLimits {
    pub minute: u64,
    pub day: u64,
}

#[derive(Clone)]
pub struct DialAdmin {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl DialAdmin {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url: trim_base_url(base_url),
            api_key,
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.get(url);
        let res = authorize(builder, ApiFlavor::Dial, self.api_key.as_deref())
            .send()
            .await
            .map_err(|err| ApiError::Upstream(format!("DIAL request failed: {}", err)))?;
        let res = error_for_status(res, "DIAL request failed").await?;
        res.json().await.map_err(ApiError::upstream)
    }

    /// Raw `data[]` entries of `/openai/models`.
    pub async fn list_models(&self) -> Result<Vec<Value>, ApiError> {
        let payload = self.get_json("/openai/models").await?;
        Ok(payload["data"].as_array().cloned().unwrap_or_default())
    }

    pub async fn embedding_models(&self) -> Result<Vec<Value>, ApiError> {
        let models = self.list_models().await?;
        Ok(models
            .into_iter()
            .filter(|m| {
                m["id"]
                    .as_str()
                    .map(|id| id.contains("text-embedding"))
                    .unwrap_or(false)
            })
            .collect())
    }

    pub async fn deployment_limits(&self, model_id: &str) -> Result<DeploymentLimits, ApiError> {
        let payload = self
            .get_json(&format!("/v1/deployments/{}/limits", model_id))
            .await?;
        Ok(DeploymentLimits {
            minute: payload["minuteTokenStats"]["total"].as_u64().unwrap_or(0),
            day: payload["dayTokenStats"]["total"].as_u64().unwrap_or(0),
        })
    }

    /// Limits of every listed model that has a non-zero quota. Models whose
    /// limits cannot be read are skipped.
    pub async fn all_limits(&self) -> Result<BTreeMap<String, DeploymentLimits>, ApiError> {
        let mut result = BTreeMap::new();
        for model in self.list_models().await? {
            let Some(id) = model["id"].as_str() else {
                continue;
            };
            match self.deployment_limits(id).await {
                Ok(limits) if limits.minute > 0 || limits.day > 0 => {
                    result.insert(id.to_string(), limits);
                }
                Ok(_) => {}
                Err(err) => tracing::debug!("No limits for {}: {}", id, err),
            }
        }
        Ok(result)
    }

    pub async fn model_info(&self, model_id: &str) -> Result<Value, ApiError> {
        self.get_json(&format!("/openai/models/{}", model_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    async fn spawn_mock() -> String {
        let app = Router::new()
            .route(
                "/openai/models",
                get(|| async {
                    Json(json!({ "data": [
                        { "id": "gpt-4o-mini-2024-07-18" },
                        { "id": "text-embedding-3-small-1" },
                        { "id": "broken" }
                    ]}))
                }),
            )
            .route(
                "/openai/models/:id",
                get(|Path(id): Path<String>| async move { Json(json!({ "id": id, "lifecycle_status": "generally-available" })) }),
            )
            .route(
                "/v1/deployments/:id/limits",
                get(|Path(id): Path<String>| async move {
                    match id.as_str() {
                        "gpt-4o-mini-2024-07-18" => Ok(Json(json!({
                            "minuteTokenStats": { "total": 100000, "used": 5 },
                            "dayTokenStats": { "total": 2000000 }
                        }))),
                        "text-embedding-3-small-1" => Ok(Json(json!({}))),
                        _ => Err(StatusCode::NOT_FOUND),
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn lists_models_limits_and_info() {
        let base = spawn_mock().await;
        let admin = DialAdmin::new(&base, Some("key".to_string()), 5).unwrap();

        assert_eq!(admin.list_models().await.unwrap().len(), 3);
        let embedding = admin.embedding_models().await.unwrap();
        assert_eq!(embedding.len(), 1);
        assert_eq!(embedding[0]["id"], "text-embedding-3-small-1");

        let limits = admin.all_limits().await.unwrap();
        assert_eq!(limits.len(), 1);
        assert_eq!(
            limits["gpt-4o-mini-2024-07-18"],
            DeploymentLimits {
                minute: 100000,
                day: 2000000
            }
        );

        let info = admin.model_info("gpt-4o-mini-2024-07-18").await.unwrap();
        assert_eq!(info["lifecycle_status"], "generally-available");
    }
}
