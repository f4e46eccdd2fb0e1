use serde::Serialize;
use serde_json::{Map, Value};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant for this web application. \
Answer using the relevant app information and the chat history you are given. \
If the information does not cover the question, say so instead of guessing.";

/// Typed view over the merged config. Every field has a default so a missing
/// `config.yml` still yields a runnable server.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub embeddings: EmbeddingSettings,
    pub rag: RagSettings,
    pub omniparser: OmniParserSettings,
    pub crawler: CrawlerSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmSettings {
    /// `dial`, `openai` or `gemini_relay`.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub relay_url: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingSettings {
    /// `dial`, `openai` or `gemini`.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub requests_per_minute: Option<u32>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RagSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub split_strategy: String,
    pub top_k: usize,
    pub tool_top_k: usize,
    pub collection: String,
    pub history_max_tokens: usize,
    pub token_counter: String,
    pub tokenizer_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OmniParserSettings {
    pub url: String,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
    pub box_threshold: f64,
    pub iou_threshold: f64,
    pub use_paddleocr: bool,
    pub imgsz: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlerSettings {
    pub max_links: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageSettings {
    pub docstore_path: String,
    pub qna_path: String,
    pub texts_dir: String,
    pub screenshot_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Value::Object(Map::new()))
    }
}

impl Settings {
    pub fn from_config(config: &Value) -> Self {
        let server = section(config, "server");
        let llm = section(config, "llm");
        let embeddings = section(config, "embeddings");
        let rag = section(config, "rag");
        let omniparser = section(config, "omniparser");
        let crawler = section(config, "crawler");
        let storage = section(config, "storage");

        let llm_provider = get_string(llm, "provider", "dial");
        let embedding_provider = get_string(embeddings, "provider", "dial");

        let chunk_size = get_u64(rag, "chunk_size", 1000).max(1) as usize;
        let mut chunk_overlap = get_u64(rag, "chunk_overlap", 200) as usize;
        if chunk_overlap >= chunk_size {
            chunk_overlap = chunk_size / 5;
        }

        Settings {
            server: ServerSettings {
                host: get_string(server, "host", "127.0.0.1"),
                port: get_u64(server, "port", 8000).clamp(1, 65535) as u16,
                cors_allowed_origins: get_string_array(server, "cors_allowed_origins"),
            },
            llm: LlmSettings {
                base_url: get_string(llm, "base_url", default_base_url(&llm_provider)),
                model: get_string(
                    llm,
                    "model",
                    match llm_provider.as_str() {
                        "openai" => "gpt-4o-mini",
                        _ => "gpt-4o-mini-2024-07-18",
                    },
                ),
                provider: llm_provider,
                api_key: get_optional_string(llm, "api_key"),
                relay_url: get_string(llm, "relay_url", "http://localhost:5000/api/gemini/generate"),
                temperature: get_f64(llm, "temperature", 0.7) as f32,
                top_p: get_f64(llm, "top_p", 1.0) as f32,
                max_tokens: get_u64(llm, "max_tokens", 1000) as u32,
                timeout_secs: get_u64(llm, "timeout_secs", 120),
                system_prompt: get_string(llm, "system_prompt", DEFAULT_SYSTEM_PROMPT),
            },
            embeddings: EmbeddingSettings {
                base_url: get_string(embeddings, "base_url", default_base_url(&embedding_provider)),
                model: get_string(
                    embeddings,
                    "model",
                    match embedding_provider.as_str() {
                        "openai" => "text-embedding-3-small",
                        "gemini" => "gemini-embedding-exp-03-07",
                        _ => "text-embedding-3-small-1",
                    },
                ),
                provider: embedding_provider,
                api_key: get_optional_string(embeddings, "api_key"),
                batch_size: get_u64(embeddings, "batch_size", 16).max(1) as usize,
                requests_per_minute: match get_u64(embeddings, "requests_per_minute", 0) {
                    0 => None,
                    rpm => Some(rpm.min(u32::MAX as u64) as u32),
                },
                timeout_secs: get_u64(embeddings, "timeout_secs", 60),
            },
            rag: RagSettings {
                chunk_size,
                chunk_overlap,
                split_strategy: get_string(rag, "split_strategy", "recursive"),
                top_k: get_u64(rag, "top_k", 5).max(1) as usize,
                tool_top_k: get_u64(rag, "tool_top_k", 3).max(1) as usize,
                collection: get_string(rag, "collection", "app_context"),
                history_max_tokens: get_u64(rag, "history_max_tokens", 100) as usize,
                token_counter: get_string(rag, "token_counter", "words"),
                tokenizer_path: get_optional_string(rag, "tokenizer_path"),
            },
            omniparser: OmniParserSettings {
                url: get_string(omniparser, "url", "http://localhost:8000/process/"),
                max_retries: get_u64(omniparser, "max_retries", 5).max(1) as u32,
                retry_delay_secs: get_u64(omniparser, "retry_delay_secs", 10),
                timeout_secs: get_u64(omniparser, "timeout_secs", 600),
                box_threshold: get_f64(omniparser, "box_threshold", 0.05),
                iou_threshold: get_f64(omniparser, "iou_threshold", 0.1),
                use_paddleocr: get_bool(omniparser, "use_paddleocr", true),
                imgsz: get_u64(omniparser, "imgsz", 640) as u32,
            },
            crawler: CrawlerSettings {
                max_links: get_u64(crawler, "max_links", 10).max(1) as usize,
                timeout_secs: get_u64(crawler, "timeout_secs", 10),
            },
            storage: StorageSettings {
                docstore_path: get_string(storage, "docstore_path", "storage/documents.json"),
                qna_path: get_string(storage, "qna_path", "storage/qna_data.json"),
                texts_dir: get_string(storage, "texts_dir", "storage/texts"),
                screenshot_dir: get_string(storage, "screenshot_dir", "screenshots"),
            },
        }
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider {
        "openai" => "https://api.openai.com/v1",
        "gemini" => "https://generativelanguage.googleapis.com/v1beta",
        _ => "https://ai-proxy.lab.epam.com",
    }
}

fn section<'a>(config: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    config.get(key).and_then(Value::as_object)
}

fn get_string(section: Option<&Map<String, Value>>, key: &str, default: &str) -> String {
    section
        .and_then(|s| s.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn get_optional_string(section: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    section
        .and_then(|s| s.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn get_u64(section: Option<&Map<String, Value>>, key: &str, default: u64) -> u64 {
    section
        .and_then(|s| s.get(key))
        .and_then(Value::as_u64)
        .unwrap_or(default)
}

fn get_f64(section: Option<&Map<String, Value>>, key: &str, default: f64) -> f64 {
    section
        .and_then(|s| s.get(key))
        .and_then(Value::as_f64)
        .unwrap_or(default)
}

fn get_bool(section: Option<&Map<String, Value>>, key: &str, default: bool) -> bool {
    section
        .and_then(|s| s.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

fn get_string_array(section: Option<&Map<String, Value>>, key: &str) -> Vec<String> {
    section
        .and_then(|s| s.get(key))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
