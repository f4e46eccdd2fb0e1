//! Document model plus the loaders that feed the index: JSON docstores,
//! QnA files, plain-text folders and web pages.

mod docstore;
mod html;
mod web;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use docstore::{load_docstore, load_qna, load_text_dir, qna_to_documents, save_docstore};
pub use html::{extract_links, html_to_text};
pub use web::{registrable_domain, Crawler, WebLoader};

/// A unit of source text with free-form metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_source(page_content: impl Into<String>, source: &str) -> Self {
        let mut doc = Self::new(page_content);
        doc.metadata
            .insert("source".to_string(), Value::String(source.to_string()));
        doc
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}
