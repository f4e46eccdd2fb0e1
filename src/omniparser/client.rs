use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;

use crate::core::config::OmniParserSettings;
use crate::core::errors::ApiError;
use crate::core::http::build_client;

#[derive(Clone)]
pub struct OmniParserClient {
    client: Client,
    settings: OmniParserSettings,
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Text of a parse result: a JSON string as-is, otherwise its `content`.
pub fn parsed_text(result: &Value) -> String {
    match result {
        Value::String(text) => text.clone(),
        other => other["content"].as_str().unwrap_or_default().to_string(),
    }
}

/// `null`, `false`, `0`, `""`, `[]` and `{}` count as a failed attempt.
fn is_empty_result(result: &Value) -> bool {
    match result {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}

impl OmniParserClient {
    pub fn new(settings: &OmniParserSettings) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_client(settings.timeout_secs)?,
            settings: settings.clone(),
        })
    }

    /// One POST of the image to the parser.
    pub async fn parse(&self, image_path: &Path) -> Result<Value, ApiError> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Cannot read {}: {}", image_path.display(), e)))?;
        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "screenshot".to_string());
        let image = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(image_path))
            .map_err(ApiError::internal)?;

        let form = Form::new()
            .text("prompt", "")
            .text("box_threshold", self.settings.box_threshold.to_string())
            .text("iou_threshold", self.settings.iou_threshold.to_string())
            .text("use_paddleocr", self.settings.use_paddleocr.to_string())
            .text("imgsz", self.settings.imgsz.to_string())
            .part("image", image);

        let res = self
            .client
            .post(&self.settings.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Upstream(format!("Timeout while processing {}", image_path.display()))
                } else {
                    ApiError::Upstream(format!("OmniParser request failed: {}", e))
                }
            })?;

        let status = res.status();
        if status != reqwest::StatusCode::OK {
            return Err(ApiError::Upstream(format!(
                "HTTP {} for {}",
                status.as_u16(),
                image_path.display()
            )));
        }
        let value: Value = res.json().await.map_err(ApiError::upstream)?;
        tracing::info!("Parsed output received from OmniParser for {}", image_path.display());
        Ok(value)
    }

    /// Retries `parse` up to `max_retries` times with a fixed pause between
    /// attempts. `None` once every attempt failed.
    pub async fn parse_with_retries(&self, image_path: &Path) -> Option<Value> {
        let attempts = self.settings.max_retries.max(1);
        for attempt in 1..=attempts {
            match self.parse(image_path).await {
                Ok(value) if is_empty_result(&value) => {
                    tracing::warn!("Empty result for {}", image_path.display());
                }
                Ok(value) => return Some(value),
                Err(err) => tracing::warn!("{}", err),
            }
            if attempt < attempts {
                tracing::info!(
                    "Retrying {}... (Attempt {}/{})",
                    image_path.display(),
                    attempt,
                    attempts
                );
                tokio::time::sleep(Duration::from_secs(self.settings.retry_delay_secs)).await;
            }
        }
        tracing::error!(
            "Failed to process {} after {} attempts",
            image_path.display(),
            attempts
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::json;

    use crate::core::config::Settings;

    #[derive(Clone, Default)]
    struct Mock {
        calls: Arc<AtomicUsize>,
        fail_first: usize,
        empty_body: bool,
        last_body: Arc<Mutex<String>>,
    }

    async fn handler(State(mock): State<Mock>, body: Bytes) -> Result<Json<Value>, StatusCode> {
        let n = mock.calls.fetch_add(1, Ordering::SeqCst);
        *mock.last_body.lock().unwrap() = String::from_utf8_lossy(&body).to_string();
        if n < mock.fail_first {
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
        if mock.empty_body {
            return Ok(Json(json!({})));
        }
        Ok(Json(json!({ "content": "Login button at top right" })))
    }

    async fn spawn(mock: Mock) -> String {
        let app = Router::new().route("/process/", post(handler)).with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/process/", addr)
    }

    fn settings(url: String, max_retries: u32) -> OmniParserSettings {
        let mut settings = Settings::default().omniparser;
        settings.url = url;
        settings.max_retries = max_retries;
        settings.retry_delay_secs = 0;
        settings.timeout_secs = 5;
        settings
    }

    fn image() -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".PNG").tempfile().unwrap();
        std::fs::write(file.path(), b"\x89PNG fake").unwrap();
        file
    }

    #[test]
    fn parsed_text_accepts_string_or_content() {
        assert_eq!(parsed_text(&json!("raw text")), "raw text");
        assert_eq!(parsed_text(&json!({ "content": "c" })), "c");
        assert_eq!(parsed_text(&json!({ "other": 1 })), "");
    }

    #[tokio::test]
    async fn sends_form_fields_and_image() {
        let mock = Mock::default();
        let url = spawn(mock.clone()).await;
        let client = OmniParserClient::new(&settings(url, 1)).unwrap();
        let file = image();

        let result = client.parse(file.path()).await.unwrap();
        assert_eq!(parsed_text(&result), "Login button at top right");

        let body = mock.last_body.lock().unwrap().clone();
        assert!(body.contains("name=\"box_threshold\"\r\n\r\n0.05"));
        assert!(body.contains("name=\"iou_threshold\"\r\n\r\n0.1"));
        assert!(body.contains("name=\"use_paddleocr\"\r\n\r\ntrue"));
        assert!(body.contains("name=\"imgsz\"\r\n\r\n640"));
        assert!(body.contains("name=\"image\""));
        assert!(body.contains("image/png"));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let mock = Mock {
            fail_first: 2,
            ..Default::default()
        };
        let url = spawn(mock.clone()).await;
        let client = OmniParserClient::new(&settings(url, 5)).unwrap();
        let file = image();

        assert!(client.parse_with_retries(file.path()).await.is_some());
        assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let mock = Mock {
            fail_first: usize::MAX,
            ..Default::default()
        };
        let url = spawn(mock.clone()).await;
        let client = OmniParserClient::new(&settings(url, 3)).unwrap();
        let file = image();

        assert!(client.parse_with_retries(file.path()).await.is_none());
        assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_object_is_retried_like_a_failure() {
        let mock = Mock {
            empty_body: true,
            ..Default::default()
        };
        let url = spawn(mock.clone()).await;
        let client = OmniParserClient::new(&settings(url, 3)).unwrap();
        let file = image();

        assert!(client.parse_with_retries(file.path()).await.is_none());
        assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn empty_results_are_detected() {
        assert!(is_empty_result(&json!({})));
        assert!(is_empty_result(&json!("")));
        assert!(is_empty_result(&json!([])));
        assert!(is_empty_result(&Value::Null));
        assert!(!is_empty_result(&json!({ "content": "" })));
        assert!(!is_empty_result(&json!("text")));
    }
}
