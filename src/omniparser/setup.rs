use std::path::{Path, PathBuf};

use serde::Serialize;

use super::client::{parsed_text, OmniParserClient};
use crate::core::config::{AppPaths, Settings};
use crate::core::errors::ApiError;
use crate::documents::{save_docstore, Document};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextSetupReport {
    pub parsed: Vec<String>,
    pub failed: Vec<String>,
    pub saved: usize,
}

/// Parses every screenshot in a folder and writes the texts to the docstore.
pub struct ContextSetup {
    client: OmniParserClient,
    screenshot_dir: PathBuf,
    docstore_path: PathBuf,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl ContextSetup {
    pub fn new(client: OmniParserClient, screenshot_dir: PathBuf, docstore_path: PathBuf) -> Self {
        Self {
            client,
            screenshot_dir,
            docstore_path,
        }
    }

    pub fn from_settings(settings: &Settings, paths: &AppPaths) -> Result<Self, ApiError> {
        Ok(Self::new(
            OmniParserClient::new(&settings.omniparser)?,
            paths.resolve(&settings.storage.screenshot_dir),
            paths.resolve(&settings.storage.docstore_path),
        ))
    }

    fn screenshots(&self) -> Result<Vec<PathBuf>, ApiError> {
        let entries = std::fs::read_dir(&self.screenshot_dir).map_err(|e| {
            ApiError::BadRequest(format!(
                "Cannot read screenshot directory {}: {}",
                self.screenshot_dir.display(),
                e
            ))
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Screenshots are parsed one at a time in file-name order. An empty
    /// result leaves an existing docstore untouched.
    pub async fn run(&self) -> Result<ContextSetupReport, ApiError> {
        let files = self.screenshots()?;
        let mut report = ContextSetupReport::default();
        let mut docs = Vec::new();

        for (idx, path) in files.iter().enumerate() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            tracing::info!("Processing screenshot {}: {}", idx + 1, name);

            match self.client.parse_with_retries(path).await {
                Some(result) => {
                    let text = parsed_text(&result);
                    if !text.trim().is_empty() {
                        docs.push(Document::with_source(text, &name));
                    }
                    report.parsed.push(name);
                }
                None => {
                    tracing::error!("Failed to parse {} after retries", name);
                    report.failed.push(name);
                }
            }
        }

        if save_docstore(&self.docstore_path, &docs)? {
            report.saved = docs.len();
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Bytes, routing::post, Json, Router};
    use serde_json::{json, Value};

    use crate::documents::load_docstore;

    async fn spawn() -> String {
        // Echoes back which file was sent; `broken.jpg` fails.
        let app = Router::new().route(
            "/process/",
            post(|body: Bytes| async move {
                let body = String::from_utf8_lossy(&body).to_string();
                if body.contains("filename=\"broken.jpg\"") {
                    return Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
                }
                let text = if body.contains("filename=\"a_home.png\"") {
                    json!("Home page with a search bar")
                } else if body.contains("filename=\"c_blank.jpeg\"") {
                    json!({ "content": "" })
                } else {
                    json!({ "content": "Cart page with checkout button" })
                };
                Ok::<Json<Value>, axum::http::StatusCode>(Json(text))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/process/", addr)
    }

    #[tokio::test]
    async fn parses_sorted_images_and_saves_docstore() {
        let dir = tempfile::tempdir().unwrap();
        let shots = dir.path().join("screenshots");
        std::fs::create_dir_all(&shots).unwrap();
        for name in ["b_cart.PNG", "a_home.png", "broken.jpg", "c_blank.jpeg", "notes.txt"] {
            std::fs::write(shots.join(name), b"img").unwrap();
        }
        let docstore = dir.path().join("storage/documents.json");

        let mut settings = Settings::default().omniparser;
        settings.url = spawn().await;
        settings.max_retries = 2;
        settings.retry_delay_secs = 0;
        let setup = ContextSetup::new(
            OmniParserClient::new(&settings).unwrap(),
            shots,
            docstore.clone(),
        );

        let report = setup.run().await.unwrap();
        assert_eq!(report.parsed, vec!["a_home.png", "b_cart.PNG", "c_blank.jpeg"]);
        assert_eq!(report.failed, vec!["broken.jpg"]);
        assert_eq!(report.saved, 2);

        let docs = load_docstore(&docstore).unwrap();
        assert_eq!(docs[0].page_content, "Home page with a search bar");
        assert_eq!(docs[1].page_content, "Cart page with checkout button");
    }

    #[tokio::test]
    async fn missing_directory_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let setup = ContextSetup::new(
            OmniParserClient::new(&Settings::default().omniparser).unwrap(),
            dir.path().join("nope"),
            dir.path().join("documents.json"),
        );
        assert!(matches!(setup.run().await, Err(ApiError::BadRequest(_))));
    }
}
