use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use super::Document;
use crate::core::errors::ApiError;

/// Reads a JSON array of `{"page_content": ...}` records. A missing file is
/// an empty store.
pub fn load_docstore(path: &Path) -> Result<Vec<Document>, ApiError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).map_err(ApiError::internal)?;
    let docs: Vec<Document> = serde_json::from_str(&contents).map_err(|err| {
        ApiError::Internal(format!("Invalid docstore {}: {}", path.display(), err))
    })?;
    Ok(docs)
}

/// Writes documents as a pretty JSON array. Returns `false` without touching
/// the file when there is nothing to save.
pub fn save_docstore(path: &Path, docs: &[Document]) -> Result<bool, ApiError> {
    if docs.is_empty() {
        tracing::warn!("No documents to save to {}", path.display());
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(ApiError::internal)?;
    }
    let json = serde_json::to_string_pretty(docs).map_err(ApiError::internal)?;
    fs::write(path, json).map_err(ApiError::internal)?;
    tracing::info!("Saved {} documents to {}", docs.len(), path.display());
    Ok(true)
}

pub fn load_qna(path: &Path) -> Result<Vec<Document>, ApiError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).map_err(ApiError::internal)?;
    let value: Value = serde_json::from_str(&contents)
        .map_err(|err| ApiError::Internal(format!("Invalid QnA file {}: {}", path.display(), err)))?;
    let source = path.to_string_lossy();
    Ok(qna_to_documents(&value)
        .into_iter()
        .map(|text| Document::with_source(text, &source))
        .collect())
}

/// Flattens `{question: {"answer": ...}}` into `Q:/A:` blocks. Option-style
/// answers (objects) are listed one `key: value` per line in file order.
pub fn qna_to_documents(value: &Value) -> Vec<String> {
    let Some(entries) = value.as_object() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|(question, entry)| {
            let answer = entry.get("answer")?;
            match answer {
                Value::String(text) => Some(format!("Q: {}\nA: {}", question, text)),
                Value::Object(options) => Some(format_options(question, options)),
                Value::Null => None,
                other => Some(format!("Q: {}\nA: {}", question, other)),
            }
        })
        .collect()
}

fn format_options(question: &str, options: &Map<String, Value>) -> String {
    let mut lines = vec![format!("Q: {}", question), "A:".to_string()];
    for (key, value) in options {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(format!("{}: {}", key, text));
    }
    lines.join("\n")
}

/// One document per `.txt`/`.md` file, sorted by file name.
pub fn load_text_dir(dir: &Path) -> Result<Vec<Document>, ApiError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<_> = fs::read_dir(dir)
        .map_err(ApiError::internal)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "txt" | "md"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();

    let mut docs = Vec::with_capacity(files.len());
    for path in files {
        match fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => {
                docs.push(Document::with_source(text, &path.to_string_lossy()));
            }
            Ok(_) => {}
            Err(err) => tracing::warn!("Skipping {}: {}", path.display(), err),
        }
    }
    Ok(docs)
}
