use serde_json::{Map, Value};

use crate::core::errors::ApiError;

const LLM_PROVIDERS: [&str; 3] = ["dial", "openai", "gemini_relay"];
const EMBEDDING_PROVIDERS: [&str; 3] = ["dial", "openai", "gemini"];
const SPLIT_STRATEGIES: [&str; 2] = ["recursive", "character"];
const TOKEN_COUNTERS: [&str; 3] = ["words", "heuristic", "tokenizer"];

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 1, 65535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_enum_field(llm, "llm.provider", "provider", &LLM_PROVIDERS)?;
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.model", "model")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_optional_string_field(llm, "llm.relay_url", "relay_url")?;
        validate_optional_string_field(llm, "llm.system_prompt", "system_prompt")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_f64_field(llm, "llm.top_p", "top_p", 0.0, 1.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 86_400)?;
    }

    if let Some(embeddings) = expect_optional_object(root, "embeddings")? {
        validate_enum_field(
            embeddings,
            "embeddings.provider",
            "provider",
            &EMBEDDING_PROVIDERS,
        )?;
        validate_optional_string_field(embeddings, "embeddings.base_url", "base_url")?;
        validate_optional_string_field(embeddings, "embeddings.model", "model")?;
        validate_optional_string_field(embeddings, "embeddings.api_key", "api_key")?;
        validate_u64_field(embeddings, "embeddings.batch_size", "batch_size", 1, 2048)?;
        validate_u64_field(
            embeddings,
            "embeddings.requests_per_minute",
            "requests_per_minute",
            0,
            100_000,
        )?;
        validate_u64_field(
            embeddings,
            "embeddings.timeout_secs",
            "timeout_secs",
            1,
            86_400,
        )?;
    }

    if let Some(rag) = expect_optional_object(root, "rag")? {
        validate_u64_field(rag, "rag.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(rag, "rag.chunk_overlap", "chunk_overlap", 0, 1_000_000)?;
        if let (Some(size), Some(overlap)) = (
            rag.get("chunk_size").and_then(Value::as_u64),
            rag.get("chunk_overlap").and_then(Value::as_u64),
        ) {
            if overlap >= size {
                return Err(ApiError::BadRequest(format!(
                    "Invalid config at 'rag.chunk_overlap': must be smaller than chunk_size ({})",
                    size
                )));
            }
        }
        validate_enum_field(rag, "rag.split_strategy", "split_strategy", &SPLIT_STRATEGIES)?;
        validate_u64_field(rag, "rag.top_k", "top_k", 1, 1000)?;
        validate_u64_field(rag, "rag.tool_top_k", "tool_top_k", 1, 1000)?;
        validate_optional_string_field(rag, "rag.collection", "collection")?;
        validate_u64_field(
            rag,
            "rag.history_max_tokens",
            "history_max_tokens",
            1,
            1_000_000,
        )?;
        validate_enum_field(rag, "rag.token_counter", "token_counter", &TOKEN_COUNTERS)?;
        validate_optional_string_field(rag, "rag.tokenizer_path", "tokenizer_path")?;
    }

    if let Some(omniparser) = expect_optional_object(root, "omniparser")? {
        validate_optional_string_field(omniparser, "omniparser.url", "url")?;
        validate_u64_field(omniparser, "omniparser.max_retries", "max_retries", 1, 100)?;
        validate_u64_field(
            omniparser,
            "omniparser.retry_delay_secs",
            "retry_delay_secs",
            0,
            3600,
        )?;
        validate_u64_field(
            omniparser,
            "omniparser.timeout_secs",
            "timeout_secs",
            1,
            86_400,
        )?;
        validate_f64_field(
            omniparser,
            "omniparser.box_threshold",
            "box_threshold",
            0.0,
            1.0,
        )?;
        validate_f64_field(
            omniparser,
            "omniparser.iou_threshold",
            "iou_threshold",
            0.0,
            1.0,
        )?;
        validate_u64_field(omniparser, "omniparser.imgsz", "imgsz", 32, 8192)?;
        validate_bool_field(omniparser, "omniparser.use_paddleocr", "use_paddleocr")?;
    }

    if let Some(crawler) = expect_optional_object(root, "crawler")? {
        validate_u64_field(crawler, "crawler.max_links", "max_links", 1, 10_000)?;
        validate_u64_field(crawler, "crawler.timeout_secs", "timeout_secs", 1, 3600)?;
    }

    if let Some(storage) = expect_optional_object(root, "storage")? {
        for key in ["docstore_path", "qna_path", "texts_dir", "screenshot_dir"] {
            validate_optional_string_field(storage, &format!("storage.{}", key), key)?;
        }
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if !allowed.contains(&text) {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': expected one of {}",
            path,
            allowed.join(", ")
        )));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_and_typical_config() {
        assert!(validate_config(&json!({})).is_ok());
        let config = json!({
            "server": { "host": "0.0.0.0", "port": 8000, "cors_allowed_origins": ["*"] },
            "llm": { "provider": "dial", "temperature": 0.7, "top_p": 1.0, "max_tokens": 1000 },
            "embeddings": { "provider": "gemini", "batch_size": 16 },
            "rag": { "chunk_size": 1000, "chunk_overlap": 200, "split_strategy": "recursive" },
            "omniparser": { "max_retries": 5, "retry_delay_secs": 10, "box_threshold": 0.05 }
        });
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let config = json!({ "rag": { "chunk_size": 500, "chunk_overlap": 500 } });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("rag.chunk_overlap"));
    }

    #[test]
    fn rejects_unknown_provider_and_wrong_types() {
        let config = json!({ "llm": { "provider": "llama" } });
        assert!(validate_config(&config).is_err());

        let config = json!({ "rag": { "top_k": "five" } });
        let err = validate_config(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "bad request: Invalid config at 'rag.top_k': expected integer"
        );

        let config = json!({ "server": [] });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        let config = json!({ "llm": { "temperature": 3.5 } });
        assert!(validate_config(&config).is_err());

        let config = json!({ "server": { "port": 0 } });
        assert!(validate_config(&config).is_err());
    }
}
